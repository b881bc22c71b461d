/// Account state machine backed by runtime sqlx queries
///
/// Owns the identity record: creation, status transitions, the consecutive
/// failed-login counter, and display-name changes. Credential evaluation
/// lives in the credential service; this type only mutates account state.

use crate::{
    account::{AccountStatus, AuthProvider},
    db::models::Account,
    error::{AuthError, AuthResult},
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Minimum days between display-name changes (first set is always allowed)
const DISPLAY_NAME_COOLDOWN_DAYS: i64 = 30;

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, display_name, status, provider, \
     external_id, failed_logins, last_login_at, display_name_changed_at, created_at";

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
}

impl AccountManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a password-based account. Starts in PENDING_VERIFICATION.
    pub async fn create_password_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<Account> {
        if self.email_exists(email).await? {
            return Err(AuthError::Conflict("Email already registered".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO account (id, email, password_hash, status, provider, failed_logins, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        )
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(AccountStatus::PendingVerification.as_str())
        .bind(AuthProvider::Password.as_str())
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get_account(&id).await
    }

    /// Create a provider-linked account. Starts in PENDING_PROFILE: there is
    /// no email step for provider accounts.
    pub async fn create_provider_account(
        &self,
        provider: AuthProvider,
        external_id: &str,
        email: Option<&str>,
    ) -> AuthResult<Account> {
        if provider == AuthProvider::Password {
            return Err(AuthError::Validation(
                "Provider accounts cannot use the password provider".to_string(),
            ));
        }

        if let Some(email) = email {
            if self.email_exists(email).await? {
                return Err(AuthError::Conflict("Email already registered".to_string()));
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO account (id, email, status, provider, external_id, failed_logins, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        )
        .bind(&id)
        .bind(email)
        .bind(AccountStatus::PendingProfile.as_str())
        .bind(provider.as_str())
        .bind(external_id)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get_account(&id).await
    }

    /// Get account by id
    pub async fn get_account(&self, id: &str) -> AuthResult<Account> {
        let query = format!("SELECT {} FROM account WHERE id = ?1", ACCOUNT_COLUMNS);

        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AuthError::NotFound("Account not found".to_string()))
    }

    /// Find account by email
    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let query = format!("SELECT {} FROM account WHERE email = ?1", ACCOUNT_COLUMNS);

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(email)
            .fetch_optional(&self.db)
            .await?)
    }

    /// Find account by provider identity
    pub async fn find_by_provider(
        &self,
        provider: AuthProvider,
        external_id: &str,
    ) -> AuthResult<Option<Account>> {
        let query = format!(
            "SELECT {} FROM account WHERE provider = ?1 AND external_id = ?2",
            ACCOUNT_COLUMNS
        );

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(provider.as_str())
            .bind(external_id)
            .fetch_optional(&self.db)
            .await?)
    }

    /// Check if email exists
    async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Parse the stored status column
    pub fn status_of(&self, account: &Account) -> AuthResult<AccountStatus> {
        AccountStatus::parse(&account.status)
            .ok_or_else(|| AuthError::Internal(format!("Unknown account status: {}", account.status)))
    }

    /// Set account status
    pub async fn set_status(&self, id: &str, status: AccountStatus) -> AuthResult<()> {
        let result = sqlx::query("UPDATE account SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("Account not found".to_string()));
        }

        tracing::debug!(account_id = id, status = status.as_str(), "account status updated");

        Ok(())
    }

    /// Record a failed password check and return the new consecutive-failure
    /// count. Single atomic read-modify-write so two concurrent failures
    /// cannot both observe the pre-threshold count.
    pub async fn record_login_failure(&self, id: &str) -> AuthResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "UPDATE account SET failed_logins = failed_logins + 1 WHERE id = ?1
             RETURNING failed_logins",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Record a successful login: counter back to zero, stamp last login
    pub async fn record_login_success(&self, id: &str) -> AuthResult<()> {
        sqlx::query("UPDATE account SET failed_logins = 0, last_login_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Reset the failure counter without touching the login timestamp
    /// (used when a lock is lifted through the verification-token path)
    pub async fn reset_failed_logins(&self, id: &str) -> AuthResult<()> {
        sqlx::query("UPDATE account SET failed_logins = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Update the stored password hash
    pub async fn set_password_hash(&self, id: &str, password_hash: &str) -> AuthResult<()> {
        sqlx::query("UPDATE account SET password_hash = ?1 WHERE id = ?2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Whether the account has crossed the inactivity threshold
    pub fn is_past_dormancy(&self, account: &Account, dormancy_days: i64) -> bool {
        match account.last_login_at {
            Some(last) => Utc::now() - last > Duration::days(dormancy_days),
            // Never logged in: the verification/profile steps gate activity
            None => false,
        }
    }

    /// Set or change the display name.
    ///
    /// First set activates a PENDING_PROFILE account. Later changes are
    /// limited to one per 30 days.
    pub async fn set_display_name(&self, id: &str, display_name: &str) -> AuthResult<Account> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("Display name cannot be empty".to_string()));
        }
        if name.len() > 32 {
            return Err(AuthError::Validation("Display name too long".to_string()));
        }

        let account = self.get_account(id).await?;

        if account.display_name.is_some() {
            if let Some(changed_at) = account.display_name_changed_at {
                if Utc::now() - changed_at < Duration::days(DISPLAY_NAME_COOLDOWN_DAYS) {
                    return Err(AuthError::Validation(format!(
                        "Display name can be changed once every {} days",
                        DISPLAY_NAME_COOLDOWN_DAYS
                    )));
                }
            }
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE account SET display_name = ?1, display_name_changed_at = ?2 WHERE id = ?3",
        )
        .bind(name)
        .bind(now)
        .bind(id)
        .execute(&self.db)
        .await?;

        // First profile completion activates the account
        if self.status_of(&account)? == AccountStatus::PendingProfile {
            self.set_status(id, AccountStatus::Active).await?;
        }

        self.get_account(id).await
    }

    /// Seed helper for tests: backdate the last successful login
    #[cfg(test)]
    pub async fn backdate_last_login(&self, id: &str, when: chrono::DateTime<Utc>) -> AuthResult<()> {
        sqlx::query("UPDATE account SET last_login_at = ?1 WHERE id = ?2")
            .bind(when)
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    async fn manager() -> AccountManager {
        AccountManager::new(memory_pool().await)
    }

    #[tokio::test]
    async fn test_password_account_starts_pending_verification() {
        let mgr = manager().await;

        let account = mgr
            .create_password_account("ace@example.com", "$argon2id$fake")
            .await
            .unwrap();

        assert_eq!(mgr.status_of(&account).unwrap(), AccountStatus::PendingVerification);
        assert_eq!(account.failed_logins, 0);
        assert!(account.password_hash.is_some());
        assert!(account.external_id.is_none());
    }

    #[tokio::test]
    async fn test_provider_account_starts_pending_profile() {
        let mgr = manager().await;

        let account = mgr
            .create_provider_account(AuthProvider::Discord, "discord-123", None)
            .await
            .unwrap();

        assert_eq!(mgr.status_of(&account).unwrap(), AccountStatus::PendingProfile);
        assert!(account.password_hash.is_none());
        assert_eq!(account.external_id.as_deref(), Some("discord-123"));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflict() {
        let mgr = manager().await;

        mgr.create_password_account("dup@example.com", "h")
            .await
            .unwrap();
        let result = mgr.create_password_account("dup@example.com", "h").await;

        match result {
            Err(AuthError::Conflict(_)) => {}
            other => panic!("Expected Conflict, got {:?}", other.map(|a| a.id)),
        }
    }

    #[tokio::test]
    async fn test_failure_counter_increments_and_resets() {
        let mgr = manager().await;
        let account = mgr
            .create_password_account("counter@example.com", "h")
            .await
            .unwrap();

        assert_eq!(mgr.record_login_failure(&account.id).await.unwrap(), 1);
        assert_eq!(mgr.record_login_failure(&account.id).await.unwrap(), 2);
        assert_eq!(mgr.record_login_failure(&account.id).await.unwrap(), 3);

        mgr.record_login_success(&account.id).await.unwrap();

        let account = mgr.get_account(&account.id).await.unwrap();
        assert_eq!(account.failed_logins, 0);
        assert!(account.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_first_display_name_activates_pending_profile() {
        let mgr = manager().await;
        let account = mgr
            .create_provider_account(AuthProvider::Google, "g-1", None)
            .await
            .unwrap();

        let account = mgr.set_display_name(&account.id, "FaZe Ace").await.unwrap();

        assert_eq!(account.display_name.as_deref(), Some("FaZe Ace"));
        assert_eq!(mgr.status_of(&account).unwrap(), AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_display_name_cooldown() {
        let mgr = manager().await;
        let account = mgr
            .create_provider_account(AuthProvider::Google, "g-2", None)
            .await
            .unwrap();

        mgr.set_display_name(&account.id, "First").await.unwrap();
        let result = mgr.set_display_name(&account.id, "Second").await;

        match result {
            Err(AuthError::Validation(msg)) => assert!(msg.contains("30 days")),
            other => panic!("Expected Validation error, got {:?}", other.map(|a| a.id)),
        }
    }

    #[tokio::test]
    async fn test_dormancy_threshold() {
        let mgr = manager().await;
        let account = mgr
            .create_password_account("sleepy@example.com", "h")
            .await
            .unwrap();

        // No login yet: not dormant
        assert!(!mgr.is_past_dormancy(&account, 180));

        mgr.backdate_last_login(&account.id, Utc::now() - Duration::days(200))
            .await
            .unwrap();
        let account = mgr.get_account(&account.id).await.unwrap();
        assert!(mgr.is_past_dormancy(&account, 180));

        mgr.backdate_last_login(&account.id, Utc::now() - Duration::days(10))
            .await
            .unwrap();
        let account = mgr.get_account(&account.id).await.unwrap();
        assert!(!mgr.is_past_dormancy(&account, 180));
    }
}
