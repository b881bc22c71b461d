/// HTTP transport for the refresh coordinator
use crate::{
    account::{AuthSession, RefreshSessionRequest},
    client::{SessionTransport, TransportError},
    error::ErrorResponse,
};
use async_trait::async_trait;
use reqwest::StatusCode;

/// `SessionTransport` backed by the auth service's HTTP API
pub struct HttpSessionTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSessionTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SessionTransport for HttpSessionTransport {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, TransportError> {
        let response = self
            .http
            .post(format!("{}/auth/refresh", self.base_url))
            .json(&RefreshSessionRequest {
                refresh_token: refresh_token.to_string(),
            })
            .send()
            .await
            .map_err(|e| TransportError::Failure(format!("refresh request failed: {}", e)))?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            // The server rejected the refresh token itself: terminal
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| "refresh token rejected".to_string());
            return Err(TransportError::Rejected(message));
        }

        if !status.is_success() {
            return Err(TransportError::Failure(format!(
                "refresh returned HTTP {}",
                status
            )));
        }

        response
            .json::<AuthSession>()
            .await
            .map_err(|e| TransportError::Failure(format!("malformed refresh response: {}", e)))
    }
}
