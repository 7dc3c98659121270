use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::errors::{BoxError, HttpError, HttpResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            bearer: None,
            body: RequestBody::Empty,
        }
    }

    pub fn post_form(url: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            bearer: None,
            body: RequestBody::Form(
                fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            bearer: None,
            body: RequestBody::Json(body),
        }
    }

    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn error_for_status(self) -> HttpResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HttpError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> HttpResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// The HTTP capability the login flow runs on.
///
/// Implementations must be safe to share between concurrent flows.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BoxError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> HttpResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HttpError::Network(Box::new(err)))?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BoxError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        builder = builder.header(ACCEPT, "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Json(body) => builder.json(body),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// Sends `request`, giving up as soon as `cancel` fires.
pub(crate) async fn send(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    cancel: &CancellationToken,
) -> HttpResult<HttpResponse> {
    if cancel.is_cancelled() {
        return Err(HttpError::Cancelled);
    }

    tracing::debug!(method = ?request.method, url = %request.url, "sending request");
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HttpError::Cancelled),
        result = transport.send(request) => {
            let response = result.map_err(HttpError::Network)?;
            tracing::debug!(status = response.status, "received response");
            Ok(response)
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::fake::ScriptedTransport;
    use super::*;

    #[test]
    fn error_for_status_keeps_body() {
        let response = HttpResponse {
            status: 429,
            body: "slow".into(),
        };
        match response.error_for_status() {
            Err(HttpError::Status { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn form_request_keeps_field_order() {
        let request = HttpRequest::post_form("https://x", &[("b", "2"), ("a", "1")]);
        assert_eq!(
            request.body,
            RequestBody::Form(vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ])
        );
    }

    #[tokio::test]
    async fn send_refuses_once_cancelled() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.respond("https://x", 200, serde_json::json!({}));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = send(transport.as_ref(), HttpRequest::get("https://x"), &cancel).await;

        assert!(matches!(result, Err(HttpError::Cancelled)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_a_network_error() {
        let transport = ScriptedTransport::default();
        transport.fail("https://x", "connection refused");

        let result = send(&transport, HttpRequest::get("https://x"), &CancellationToken::new()).await;

        assert!(matches!(result, Err(HttpError::Network(_))));
    }
}
