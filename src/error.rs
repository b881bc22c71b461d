/// Unified error types for the ScrimBase auth service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the auth service
#[derive(Error, Debug)]
pub enum AuthError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Input validation errors (password policy, malformed fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad credential or unknown account. Surfaced generically so callers
    /// cannot probe which emails are registered.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Account locked after repeated failed logins
    #[error("Account locked: {0}")]
    Locked(String),

    /// Account dormant after prolonged inactivity
    #[error("Account dormant: {0}")]
    Dormant(String),

    /// Verification token is unknown
    #[error("Invalid verification token")]
    TokenInvalid,

    /// Verification token exists but is past its expiry
    #[error("Verification token has expired")]
    TokenExpired,

    /// Verification token was already consumed
    #[error("Verification token has already been used")]
    TokenConsumed,

    /// Refresh token invalid, revoked, or expired. Terminal: the client
    /// must log out, never retry.
    #[error("Session error: {0}")]
    Session(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert AuthError to HTTP response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            AuthError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationFailed",
                self.to_string(),
            ),
            AuthError::Locked(_) => (StatusCode::FORBIDDEN, "AccountLocked", self.to_string()),
            AuthError::Dormant(_) => (StatusCode::FORBIDDEN, "AccountDormant", self.to_string()),
            AuthError::Session(_) => (
                StatusCode::UNAUTHORIZED,
                "SessionExpired",
                self.to_string(),
            ),
            AuthError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            AuthError::TokenInvalid | AuthError::TokenExpired | AuthError::TokenConsumed => {
                (StatusCode::BAD_REQUEST, "InvalidToken", self.to_string())
            }
            AuthError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            AuthError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            AuthError::Database(_) | AuthError::Internal(_) | AuthError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for auth operations
pub type AuthResult<T> = Result<T, AuthError>;
