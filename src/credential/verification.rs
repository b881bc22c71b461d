/// Verification token store
///
/// Short-lived, single-use tokens proving control of an email address.
/// Issuing a token for an (email, purpose) pair invalidates any prior
/// unconsumed token for that pair.

use crate::{
    account::TokenPurpose,
    db::models::VerificationToken,
    error::{AuthError, AuthResult},
};
use chrono::{Duration, Utc};
use rand::RngCore;
use sqlx::SqlitePool;

pub struct VerificationTokenStore {
    db: SqlitePool,
    ttl_minutes: i64,
}

impl VerificationTokenStore {
    pub fn new(db: SqlitePool, ttl_minutes: i64) -> Self {
        Self { db, ttl_minutes }
    }

    /// Issue a fresh token for (email, purpose), invalidating prior
    /// unconsumed tokens for the same pair.
    pub async fn issue(&self, email: &str, purpose: TokenPurpose) -> AuthResult<String> {
        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(self.ttl_minutes);

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "DELETE FROM verification_token WHERE email = ?1 AND purpose = ?2 AND consumed = 0",
        )
        .bind(email)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO verification_token (token, email, purpose, created_at, expires_at, consumed)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        )
        .bind(&token)
        .bind(email)
        .bind(purpose.as_str())
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(email, purpose = purpose.as_str(), "verification token issued");

        Ok(token)
    }

    /// Consume a token exactly once.
    ///
    /// Unknown, already-consumed, and expired tokens fail with distinct
    /// errors; an expired-and-unconsumed token reports "expired", not
    /// "already used".
    pub async fn consume(&self, token: &str) -> AuthResult<VerificationToken> {
        let record = sqlx::query_as::<_, VerificationToken>(
            "SELECT token, email, purpose, created_at, expires_at, consumed
             FROM verification_token WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AuthError::TokenInvalid)?;

        if record.consumed {
            return Err(AuthError::TokenConsumed);
        }

        if Utc::now() > record.expires_at {
            return Err(AuthError::TokenExpired);
        }

        sqlx::query("UPDATE verification_token SET consumed = 1 WHERE token = ?1")
            .bind(token)
            .execute(&self.db)
            .await?;

        Ok(record)
    }

    /// Delete every token past expiry, consumed or not. Returns the number
    /// of rows purged.
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM verification_token WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Test helper: force a token past its expiry
    #[cfg(test)]
    pub async fn force_expire(&self, token: &str) -> AuthResult<()> {
        sqlx::query("UPDATE verification_token SET expires_at = ?1 WHERE token = ?2")
            .bind(Utc::now() - Duration::minutes(1))
            .bind(token)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

/// 32 random bytes, hex-encoded
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    async fn store() -> VerificationTokenStore {
        VerificationTokenStore::new(memory_pool().await, 15)
    }

    #[tokio::test]
    async fn test_consume_once_then_already_used() {
        let store = store().await;
        let token = store.issue("a@example.com", TokenPurpose::Signup).await.unwrap();

        let record = store.consume(&token).await.unwrap();
        assert_eq!(record.email, "a@example.com");
        assert_eq!(record.purpose, "SIGNUP");

        match store.consume(&token).await {
            Err(AuthError::TokenConsumed) => {}
            other => panic!("Expected TokenConsumed, got {:?}", other.map(|t| t.token)),
        }
    }

    #[tokio::test]
    async fn test_expired_reported_distinct_from_consumed() {
        let store = store().await;
        let token = store.issue("b@example.com", TokenPurpose::PasswordReset).await.unwrap();

        store.force_expire(&token).await.unwrap();

        match store.consume(&token).await {
            Err(AuthError::TokenExpired) => {}
            other => panic!("Expected TokenExpired, got {:?}", other.map(|t| t.token)),
        }
    }

    #[tokio::test]
    async fn test_unknown_token_invalid() {
        let store = store().await;

        match store.consume("no-such-token").await {
            Err(AuthError::TokenInvalid) => {}
            other => panic!("Expected TokenInvalid, got {:?}", other.map(|t| t.token)),
        }
    }

    #[tokio::test]
    async fn test_reissue_invalidates_prior_unconsumed() {
        let store = store().await;

        let first = store.issue("c@example.com", TokenPurpose::Signup).await.unwrap();
        let second = store.issue("c@example.com", TokenPurpose::Signup).await.unwrap();

        match store.consume(&first).await {
            Err(AuthError::TokenInvalid) => {}
            other => panic!("Expected TokenInvalid, got {:?}", other.map(|t| t.token)),
        }
        store.consume(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_reissue_other_purpose_untouched() {
        let store = store().await;

        let signup = store.issue("d@example.com", TokenPurpose::Signup).await.unwrap();
        store.issue("d@example.com", TokenPurpose::Unlock).await.unwrap();

        // Signup token survives an unlock issuance
        store.consume(&signup).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_deletes_expired_keeps_live() {
        let store = store().await;

        let dead = store.issue("e@example.com", TokenPurpose::Signup).await.unwrap();
        store.force_expire(&dead).await.unwrap();
        let live = store.issue("f@example.com", TokenPurpose::Signup).await.unwrap();

        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 1);

        // Live token still consumable, dead one gone entirely
        store.consume(&live).await.unwrap();
        match store.consume(&dead).await {
            Err(AuthError::TokenInvalid) => {}
            other => panic!("Expected TokenInvalid, got {:?}", other.map(|t| t.token)),
        }
    }

    #[tokio::test]
    async fn test_purge_removes_consumed_expired_tokens() {
        let store = store().await;

        let token = store.issue("g@example.com", TokenPurpose::Signup).await.unwrap();
        store.consume(&token).await.unwrap();
        store.force_expire(&token).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }
}
