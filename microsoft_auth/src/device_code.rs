use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::HttpResult;
use crate::models::DeviceCodeInfo;
use crate::responses::DeviceCodeResponse;
use crate::settings::AuthSettings;
use crate::transport::{self, HttpRequest, HttpTransport};

/// Starts a device authorization by asking Microsoft for a user code.
#[derive(Clone)]
pub struct DeviceCodeRequester {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    client_id: String,
    scope: String,
}

impl DeviceCodeRequester {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &AuthSettings) -> Self {
        Self {
            transport,
            endpoint: settings.endpoints.device_code.clone(),
            client_id: settings.client_id.clone(),
            scope: settings.scope.clone(),
        }
    }

    pub async fn request_device_code(
        &self,
        cancel: &CancellationToken,
    ) -> HttpResult<DeviceCodeInfo> {
        let request = HttpRequest::post_form(
            &self.endpoint,
            &[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scope.as_str()),
            ],
        );

        let response: DeviceCodeResponse =
            transport::send(self.transport.as_ref(), request, cancel)
                .await?
                .error_for_status()?
                .json()?;

        tracing::info!(
            verification_uri = %response.verification_uri,
            interval = response.interval,
            expires_in = response.expires_in,
            "device code issued"
        );

        Ok(DeviceCodeInfo {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            interval: response.interval,
            expires_in: response.expires_in,
            message: response.message,
        })
    }
}
