/// Session token service
///
/// Issues short-lived signed access tokens and long-lived opaque refresh
/// tokens, enforces the per-account session limit, and maintains the
/// access-token blacklist. Business services consume only
/// [`SessionTokenService::resolve_principal`] and
/// [`SessionTokenService::is_oauth_account`].

use crate::{
    account::AuthProvider,
    config::ServerConfig,
    error::{AuthError, AuthResult},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Claims carried by the self-contained access token
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// The token pair handed to a client at login/refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
}

/// Resolved caller identity
#[derive(Debug, Clone)]
pub struct Principal {
    pub account_id: String,
    /// Expiry of the presented access token
    pub expires_at: DateTime<Utc>,
}

pub struct SessionTokenService {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl SessionTokenService {
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Mint an access/refresh pair for an account and enforce the session
    /// limit (oldest-created sessions are evicted first).
    pub async fn issue_session(&self, account_id: &str) -> AuthResult<SessionTokens> {
        let (access_token, access_expires_at) = self.generate_access_token(account_id)?;

        let refresh_token = generate_opaque_token();
        let now = Utc::now();
        let refresh_expires = now + Duration::days(self.config.sessions.refresh_ttl_days);

        sqlx::query(
            "INSERT INTO refresh_token (id, account_id, token, created_at, expires_at, revoked)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(&refresh_token)
        .bind(now)
        .bind(refresh_expires)
        .execute(&self.db)
        .await?;

        self.enforce_session_limit(account_id, self.config.sessions.max_sessions)
            .await?;

        Ok(SessionTokens {
            access_token,
            refresh_token,
            access_expires_at,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// revoked in the same operation, so a replayed token always fails.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<(String, SessionTokens)> {
        let row: Option<(String, String, DateTime<Utc>, bool)> = sqlx::query_as(
            "SELECT id, account_id, expires_at, revoked FROM refresh_token WHERE token = ?1",
        )
        .bind(refresh_token)
        .fetch_optional(&self.db)
        .await?;

        let (token_id, account_id, expires_at, revoked) =
            row.ok_or_else(|| AuthError::Session("Invalid refresh token".to_string()))?;

        if revoked {
            return Err(AuthError::Session("Refresh token revoked".to_string()));
        }

        if Utc::now() > expires_at {
            return Err(AuthError::Session("Refresh token expired".to_string()));
        }

        sqlx::query("UPDATE refresh_token SET revoked = 1, revoked_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(&token_id)
            .execute(&self.db)
            .await?;

        let tokens = self.issue_session(&account_id).await?;

        Ok((account_id, tokens))
    }

    /// Revoke a single refresh token. Idempotent and total: revoking an
    /// unknown or already-revoked token succeeds. Rows are kept for audit.
    pub async fn revoke(&self, refresh_token: &str) -> AuthResult<()> {
        sqlx::query(
            "UPDATE refresh_token SET revoked = 1, revoked_at = ?1 WHERE token = ?2 AND revoked = 0",
        )
        .bind(Utc::now())
        .bind(refresh_token)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Revoke every live refresh token for an account. Returns the number
    /// of sessions ended.
    pub async fn revoke_all(&self, account_id: &str) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_token SET revoked = 1, revoked_at = ?1
             WHERE account_id = ?2 AND revoked = 0 AND expires_at > ?1",
        )
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.db)
        .await?;

        let revoked = result.rows_affected();
        if revoked > 0 {
            tracing::info!(account_id, revoked, "revoked all sessions");
        }

        Ok(revoked)
    }

    /// If the account holds more than `max` active sessions, revoke the
    /// oldest-created until exactly `max` remain. Runs in one transaction
    /// so concurrent logins cannot over- or under-evict.
    pub async fn enforce_session_limit(&self, account_id: &str, max: u32) -> AuthResult<u64> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refresh_token
             WHERE account_id = ?1 AND revoked = 0 AND expires_at > ?2",
        )
        .bind(account_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let excess = active - i64::from(max);
        if excess <= 0 {
            tx.commit().await?;
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE refresh_token SET revoked = 1, revoked_at = ?1 WHERE id IN (
                 SELECT id FROM refresh_token
                 WHERE account_id = ?2 AND revoked = 0 AND expires_at > ?1
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?3
             )",
        )
        .bind(now)
        .bind(account_id)
        .bind(excess)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let evicted = result.rows_affected();
        tracing::debug!(account_id, evicted, "session limit enforced");

        Ok(evicted)
    }

    /// Blacklist an access token until its natural expiry. Idempotent:
    /// re-inserting the same token is a no-op.
    pub async fn blacklist_access_token(
        &self,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO access_token_blacklist (token_hash, expires_at, created_at)
             VALUES (?1, ?2, ?3)",
        )
        .bind(hash_token(access_token))
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Hash-lookup against the blacklist
    pub async fn is_blacklisted(&self, access_token: &str) -> AuthResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM access_token_blacklist WHERE token_hash = ?1")
                .bind(hash_token(access_token))
                .fetch_one(&self.db)
                .await?;

        Ok(count > 0)
    }

    /// Resolve the caller identity from a bearer access token: signature
    /// check, expiry check, then blacklist check. Garbage input yields an
    /// authentication error, never a fault.
    pub async fn resolve_principal(&self, access_token: &str) -> AuthResult<Principal> {
        let claims = self.verify_access_token(access_token)?;

        if self.is_blacklisted(access_token).await? {
            return Err(AuthError::Authentication("Token has been revoked".to_string()));
        }

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AuthError::Authentication("Invalid token expiry".to_string()))?;

        Ok(Principal {
            account_id: claims.sub,
            expires_at,
        })
    }

    /// Whether the account authenticates through an external provider
    pub async fn is_oauth_account(&self, account_id: &str) -> AuthResult<bool> {
        let provider: Option<String> =
            sqlx::query_scalar("SELECT provider FROM account WHERE id = ?1")
                .bind(account_id)
                .fetch_optional(&self.db)
                .await?;

        let provider =
            provider.ok_or_else(|| AuthError::NotFound("Account not found".to_string()))?;

        Ok(AuthProvider::parse(&provider)
            .map(|p| p != AuthProvider::Password)
            .unwrap_or(false))
    }

    /// Delete refresh tokens and blacklist entries past their expiry.
    /// Returns (refresh_tokens_deleted, blacklist_entries_deleted).
    pub async fn purge_expired(&self) -> AuthResult<(u64, u64)> {
        let now = Utc::now();

        let refresh = sqlx::query("DELETE FROM refresh_token WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.db)
            .await?;

        let blacklist = sqlx::query("DELETE FROM access_token_blacklist WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.db)
            .await?;

        Ok((refresh.rows_affected(), blacklist.rows_affected()))
    }

    /// Generate the signed access token
    fn generate_access_token(&self, account_id: &str) -> AuthResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.sessions.access_ttl_secs);

        let claims = AccessClaims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("Failed to generate token: {}", e)))?;

        Ok((token, expires_at))
    }

    /// Verify signature and expiry of an access token
    fn verify_access_token(&self, token: &str) -> AuthResult<AccessClaims> {
        let decoding_key = DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        let data = decode::<AccessClaims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AuthError::Authentication("Access token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AuthError::Authentication("Invalid token signature".to_string())
                }
                _ => AuthError::Authentication("Invalid access token".to_string()),
            }
        })?;

        Ok(data.claims)
    }
}

/// 32 random bytes, hex-encoded: the opaque refresh credential
fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex of a raw token; the blacklist never stores raw tokens
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
