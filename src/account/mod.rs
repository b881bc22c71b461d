/// Account domain types
///
/// Lifecycle status, auth providers, login outcomes, and the request/response
/// shapes used by the HTTP layer.

mod manager;

pub use manager::AccountManager;

use crate::db::models::Account;
use serde::{Deserialize, Serialize};

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    /// Password account awaiting email verification
    PendingVerification,
    /// Email proven (or provider-linked), display name not yet set
    PendingProfile,
    Active,
    /// Too many consecutive failed logins; escapable only via UNLOCK token
    Locked,
    /// No successful login within the inactivity threshold
    Dormant,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::PendingVerification => "PENDING_VERIFICATION",
            AccountStatus::PendingProfile => "PENDING_PROFILE",
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Locked => "LOCKED",
            AccountStatus::Dormant => "DORMANT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING_VERIFICATION" => Some(AccountStatus::PendingVerification),
            "PENDING_PROFILE" => Some(AccountStatus::PendingProfile),
            "ACTIVE" => Some(AccountStatus::Active),
            "LOCKED" => Some(AccountStatus::Locked),
            "DORMANT" => Some(AccountStatus::Dormant),
            _ => None,
        }
    }
}

/// Authentication provider for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Password,
    Google,
    Discord,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Password => "password",
            AuthProvider::Google => "google",
            AuthProvider::Discord => "discord",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "password" => Some(AuthProvider::Password),
            "google" => Some(AuthProvider::Google),
            "discord" => Some(AuthProvider::Discord),
            _ => None,
        }
    }
}

/// Purpose of a verification token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenPurpose {
    Signup,
    PasswordReset,
    Unlock,
    Reactivate,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Signup => "SIGNUP",
            TokenPurpose::PasswordReset => "PASSWORD_RESET",
            TokenPurpose::Unlock => "UNLOCK",
            TokenPurpose::Reactivate => "REACTIVATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SIGNUP" => Some(TokenPurpose::Signup),
            "PASSWORD_RESET" => Some(TokenPurpose::PasswordReset),
            "UNLOCK" => Some(TokenPurpose::Unlock),
            "REACTIVATE" => Some(TokenPurpose::Reactivate),
            _ => None,
        }
    }
}

/// Result of a login evaluation. Expected outcomes are variants, not errors,
/// so every caller handles every case.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Credentials matched, account active
    Success(Account),
    /// Credentials matched, but the display name must be set first
    NeedsProfile(Account),
    /// Generic rejection (unknown email, wrong password, unverified email)
    Failure(String),
    /// Account locked; an UNLOCK email has been issued
    Locked(String),
    /// Account dormant; a REACTIVATE email has been issued
    Dormant(String),
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub account_id: String,
    pub email: String,
    /// Whether the verification email actually went out; callers offer a
    /// resend when false
    pub verification_email_sent: bool,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// Password reset request (public boundary; always answers success-shaped)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

/// Signup verification resend request (also success-shaped at the boundary)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

/// Password reset completion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Authenticated password change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Display name setup / change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetProfileRequest {
    pub display_name: String,
}

/// Session refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionRequest {
    pub refresh_token: String,
}

/// Logout request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Login/refresh response: the wire contract shared by the server handlers
/// and the client refresh coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub account_id: String,
    pub display_name: Option<String>,
    pub status: AccountStatus,
    pub profile_setup_required: bool,
}

/// Session info (for GET /auth/session)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub account_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub status: AccountStatus,
}
