use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::HttpResult;
use crate::models::{MinecraftToken, PlayerProfile};
use crate::settings::AuthSettings;
use crate::transport::{self, HttpRequest, HttpTransport};

#[derive(Clone)]
pub struct ProfileFetcher {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
}

impl ProfileFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &AuthSettings) -> Self {
        Self {
            transport,
            endpoint: settings.endpoints.profile.clone(),
        }
    }

    /// Loads the Java Edition profile. Skin and cape states outside
    /// `ACTIVE`/`INACTIVE` fail the whole profile rather than being guessed.
    pub async fn get_profile(
        &self,
        minecraft: &MinecraftToken,
        cancel: &CancellationToken,
    ) -> HttpResult<PlayerProfile> {
        let request = HttpRequest::get(&self.endpoint).bearer_auth(&minecraft.access_token);
        let profile: PlayerProfile = transport::send(self.transport.as_ref(), request, cancel)
            .await?
            .error_for_status()?
            .json()?;

        tracing::info!(uuid = %profile.uuid, username = %profile.username, "profile loaded");
        Ok(profile)
    }
}
