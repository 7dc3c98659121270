use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{HttpError, HttpResult, XboxDenial};
use crate::models::{MinecraftToken, XboxToken, XstsToken, unix_timestamp_after};
use crate::responses::{MinecraftLoginResponse, XboxAuthResponse, XboxErrorResponse};
use crate::settings::AuthSettings;
use crate::transport::{self, HttpRequest, HttpTransport};

/// Trades a Microsoft access token for a Minecraft one through Xbox Live and
/// XSTS. Each hop feeds the next; none of them retries.
#[derive(Clone)]
pub struct IdentityChainExchanger {
    transport: Arc<dyn HttpTransport>,
    xbox_live_url: String,
    xsts_url: String,
    minecraft_login_url: String,
}

impl IdentityChainExchanger {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &AuthSettings) -> Self {
        Self {
            transport,
            xbox_live_url: settings.endpoints.xbox_live.clone(),
            xsts_url: settings.endpoints.xsts.clone(),
            minecraft_login_url: settings.endpoints.minecraft_login.clone(),
        }
    }

    /// Runs all three hops in order, stopping at the first failure.
    pub async fn exchange(
        &self,
        ms_access_token: &str,
        cancel: &CancellationToken,
    ) -> HttpResult<MinecraftToken> {
        let xbox = self.exchange_xbox_live_token(ms_access_token, cancel).await?;
        let xsts = self.exchange_xsts_token(&xbox, cancel).await?;
        self.exchange_minecraft_token(&xbox.user_hash, &xsts, cancel)
            .await
    }

    pub async fn exchange_xbox_live_token(
        &self,
        ms_access_token: &str,
        cancel: &CancellationToken,
    ) -> HttpResult<XboxToken> {
        let payload = serde_json::json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": ms_access_token
            },
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT"
        });

        let request = HttpRequest::post_json(&self.xbox_live_url, payload);
        let response: XboxAuthResponse =
            transport::send(self.transport.as_ref(), request, cancel)
                .await?
                .error_for_status()?
                .json()?;

        let user_hash = response
            .display_claims
            .xui
            .into_iter()
            .next()
            .map(|c| c.uhs)
            .ok_or(HttpError::MissingField("DisplayClaims.xui[0].uhs"))?;

        tracing::debug!("xbox live token issued");
        Ok(XboxToken {
            token: response.token,
            user_hash,
        })
    }

    pub async fn exchange_xsts_token(
        &self,
        xbox: &XboxToken,
        cancel: &CancellationToken,
    ) -> HttpResult<XstsToken> {
        let payload = serde_json::json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [xbox.token]
            },
            "RelyingParty": "rp://api.minecraftservices.com/",
            "TokenType": "JWT"
        });

        let request = HttpRequest::post_json(&self.xsts_url, payload);
        let response = transport::send(self.transport.as_ref(), request, cancel).await?;

        if response.status == 401
            && let Ok(denied) = response.json::<XboxErrorResponse>()
        {
            let denial = XboxDenial::from_code(denied.x_err);
            tracing::warn!(x_err = denied.x_err, %denial, "xsts refused the account");
            return Err(HttpError::XboxDenied(denial));
        }

        let response: XboxAuthResponse = response.error_for_status()?.json()?;
        tracing::debug!("xsts token issued");
        Ok(XstsToken {
            token: response.token,
        })
    }

    pub async fn exchange_minecraft_token(
        &self,
        user_hash: &str,
        xsts: &XstsToken,
        cancel: &CancellationToken,
    ) -> HttpResult<MinecraftToken> {
        let payload = serde_json::json!({
            "identityToken": format!("XBL3.0 x={};{}", user_hash, xsts.token)
        });

        let request = HttpRequest::post_json(&self.minecraft_login_url, payload);
        let response: MinecraftLoginResponse =
            transport::send(self.transport.as_ref(), request, cancel)
                .await?
                .error_for_status()?
                .json()?;

        tracing::debug!("minecraft token issued");
        Ok(MinecraftToken {
            access_token: response.access_token,
            expires_at: unix_timestamp_after(Duration::from_secs(response.expires_in)),
        })
    }
}
