/// Auth database models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Nullable for provider-only accounts until linked
    pub email: Option<String>,
    /// Present only for provider = password
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub status: String,
    pub provider: String,
    /// Present only for provider != password
    pub external_id: Option<String>,
    /// Consecutive failed password checks since the last success
    pub failed_logins: i64,
    pub last_login_at: Option<DateTime<Utc>>,
    pub display_name_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Refresh token record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: String,
    pub account_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Email verification token record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VerificationToken {
    pub token: String,
    pub email: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// Blacklisted access token. Stores a hash of the token, never the raw
/// value; `expires_at` mirrors the token's own expiry so the row can be
/// purged once the token would have died anyway.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BlacklistedAccessToken {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
