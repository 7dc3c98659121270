use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{PollError, PollResult};
use crate::models::{MicrosoftTokens, unix_timestamp_after};
use crate::responses::TokenPollResponse;
use crate::settings::AuthSettings;
use crate::transport::{self, HttpRequest, HttpTransport};

/// Upper bound for the polling interval, however often the server asks to
/// slow down.
pub const MAX_POLL_INTERVAL_SECS: u64 = 900;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug)]
enum PollStep {
    Granted(MicrosoftTokens),
    Pending,
    SlowDown,
}

/// Waits for the user to approve a device code.
#[derive(Clone)]
pub struct TokenPoller {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    client_id: String,
}

impl TokenPoller {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &AuthSettings) -> Self {
        Self {
            transport,
            endpoint: settings.endpoints.token.clone(),
            client_id: settings.client_id.clone(),
        }
    }

    /// Polls the token endpoint until the user approves, the server ends the
    /// session, or `cancel` fires.
    ///
    /// There is no retry budget: the device code's own expiry bounds the wait.
    /// `slow_down` doubles the interval up to [`MAX_POLL_INTERVAL_SECS`].
    pub async fn poll_for_token(
        &self,
        device_code: &str,
        interval_secs: u64,
        cancel: &CancellationToken,
    ) -> PollResult<MicrosoftTokens> {
        let mut interval = interval_secs.clamp(1, MAX_POLL_INTERVAL_SECS);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("token polling cancelled");
                    return Err(PollError::Cancelled);
                }
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            }

            match self.poll_once(device_code, cancel).await? {
                PollStep::Granted(tokens) => return Ok(tokens),
                PollStep::Pending => tracing::trace!(interval, "authorization pending"),
                PollStep::SlowDown => {
                    interval = next_interval(interval);
                    tracing::warn!(interval, "token endpoint asked to slow down");
                }
            }
        }
    }

    async fn poll_once(
        &self,
        device_code: &str,
        cancel: &CancellationToken,
    ) -> PollResult<PollStep> {
        let request = HttpRequest::post_form(
            &self.endpoint,
            &[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
            ],
        );

        // Pending and failure answers come back as HTTP 400, so the body
        // decides, not the status.
        let response = transport::send(self.transport.as_ref(), request, cancel).await?;
        classify(response.json()?)
    }
}

pub(crate) fn next_interval(current: u64) -> u64 {
    current.saturating_mul(2).min(MAX_POLL_INTERVAL_SECS)
}

fn classify(response: TokenPollResponse) -> PollResult<PollStep> {
    if let Some(access_token) = response.access_token {
        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        tracing::info!("microsoft token granted");
        return Ok(PollStep::Granted(MicrosoftTokens {
            access_token,
            refresh_token: response.refresh_token,
            expires_at: unix_timestamp_after(Duration::from_secs(lifetime)),
        }));
    }

    match response.error.as_deref() {
        Some("authorization_pending") => Ok(PollStep::Pending),
        Some("slow_down") => Ok(PollStep::SlowDown),
        Some("authorization_declined") => Err(PollError::Declined),
        Some("expired_token") => Err(PollError::Expired),
        Some("bad_verification_code") => Err(PollError::BadVerificationCode),
        Some(other) => {
            tracing::error!(
                error = other,
                description = response.error_description.as_deref().unwrap_or_default(),
                "token endpoint returned an unknown error"
            );
            Err(PollError::Unknown(other.to_string()))
        }
        None => Err(PollError::Unknown(
            "response carried neither access_token nor error".to_string(),
        )),
    }
}
