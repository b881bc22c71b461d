/// Authentication extractors
use crate::{api::middleware::extract_bearer_token, context::AppContext, error::AuthError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};

/// Authenticated context - resolves and validates the bearer principal
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: String,
    /// Raw bearer token, kept so logout can blacklist it
    pub access_token: String,
    /// Expiry of the presented token
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AuthError::Authentication("Missing authorization header".to_string()))?;

        let principal = state.sessions.resolve_principal(&token).await?;

        Ok(AuthContext {
            account_id: principal.account_id,
            access_token: token,
            expires_at: principal.expires_at,
        })
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_bearer_token(&parts.headers) {
            Some(token) => match state.sessions.resolve_principal(&token).await {
                Ok(principal) => Some(AuthContext {
                    account_id: principal.account_id,
                    access_token: token,
                    expires_at: principal.expires_at,
                }),
                Err(_) => None,
            },
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}
