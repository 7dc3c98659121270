use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::HttpResult;
use crate::models::MinecraftToken;
use crate::responses::EntitlementsResponse;
use crate::settings::AuthSettings;
use crate::transport::{self, HttpRequest, HttpTransport};

#[derive(Clone)]
pub struct EntitlementChecker {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
}

impl EntitlementChecker {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &AuthSettings) -> Self {
        Self {
            transport,
            endpoint: settings.endpoints.entitlements.clone(),
        }
    }

    /// Whether the account owns the game: any entitlement with a non-empty
    /// signature counts.
    pub async fn has_game(
        &self,
        minecraft: &MinecraftToken,
        cancel: &CancellationToken,
    ) -> HttpResult<bool> {
        let request = HttpRequest::get(&self.endpoint).bearer_auth(&minecraft.access_token);
        let response: EntitlementsResponse =
            transport::send(self.transport.as_ref(), request, cancel)
                .await?
                .error_for_status()?
                .json()?;

        let owned: Vec<&str> = response
            .items
            .iter()
            .filter(|item| item.signature.as_deref().is_some_and(|s| !s.is_empty()))
            .map(|item| item.name.as_str())
            .collect();

        tracing::debug!(entitlements = ?owned, "entitlements checked");
        Ok(!owned.is_empty())
    }
}
