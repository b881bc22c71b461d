/// Credential service: the write-side of the account state machine.
///
/// Expected outcomes (wrong password, locked account, unverified email) are
/// `LoginOutcome` variants, not errors; only store faults surface as `Err`.

use crate::{
    account::{AccountManager, AccountStatus, AuthProvider, LoginOutcome, TokenPurpose},
    config::ServerConfig,
    credential::{password, VerificationTokenStore},
    db::models::{Account, VerificationToken},
    error::{AuthError, AuthResult},
    mailer::Mailer,
    session::SessionTokenService,
};
use std::sync::Arc;

pub struct CredentialService {
    accounts: Arc<AccountManager>,
    tokens: Arc<VerificationTokenStore>,
    sessions: Arc<SessionTokenService>,
    mailer: Arc<Mailer>,
    config: Arc<ServerConfig>,
}

impl CredentialService {
    pub fn new(
        accounts: Arc<AccountManager>,
        tokens: Arc<VerificationTokenStore>,
        sessions: Arc<SessionTokenService>,
        mailer: Arc<Mailer>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            accounts,
            tokens,
            sessions,
            mailer,
            config,
        }
    }

    /// Register a password account and attempt delivery of the signup
    /// verification email. Registration succeeds even when delivery fails;
    /// the returned boolean lets the caller offer a resend.
    pub async fn register(&self, email: &str, password_input: &str) -> AuthResult<(Account, bool)> {
        let email = normalize_email(email)?;
        password::check_policy(password_input)?;

        let password_hash = password::hash_password(password_input)?;
        let account = self
            .accounts
            .create_password_account(&email, &password_hash)
            .await?;

        let delivered = self.send_verification(&email, TokenPurpose::Signup).await?;

        tracing::info!(account_id = %account.id, delivered, "account registered");

        Ok((account, delivered))
    }

    /// Reissue the signup verification email. The prior unconsumed token is
    /// invalidated by the store.
    pub async fn resend_signup_email(&self, email: &str) -> AuthResult<bool> {
        let email = normalize_email(email)?;

        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AuthError::NotFound("Account not found".to_string()))?;

        if self.accounts.status_of(&account)? != AccountStatus::PendingVerification {
            return Err(AuthError::Validation("Email is already verified".to_string()));
        }

        self.send_verification(&email, TokenPurpose::Signup).await
    }

    /// Consume a verification token. SIGNUP consumption advances the
    /// account to PENDING_PROFILE; UNLOCK/REACTIVATE consumption proves
    /// email control but leaves the status to the password-reset step.
    pub async fn verify_token(&self, token: &str) -> AuthResult<VerificationToken> {
        let record = self.tokens.consume(token).await?;

        let purpose = TokenPurpose::parse(&record.purpose)
            .ok_or_else(|| AuthError::Internal(format!("Unknown token purpose: {}", record.purpose)))?;

        if purpose == TokenPurpose::Signup {
            if let Some(account) = self.accounts.find_by_email(&record.email).await? {
                if self.accounts.status_of(&account)? == AccountStatus::PendingVerification {
                    self.accounts
                        .set_status(&account.id, AccountStatus::PendingProfile)
                        .await?;
                    tracing::info!(account_id = %account.id, "email verified");
                }
            }
        }

        Ok(record)
    }

    /// Evaluate a password login.
    ///
    /// Order: unknown email, then status gates, then the dormancy threshold,
    /// then the password itself. The password check runs before a
    /// NeedsProfile outcome so an unfinished profile never weakens the
    /// credential check.
    pub async fn login(&self, email: &str, password_input: &str) -> AuthResult<LoginOutcome> {
        const GENERIC_FAILURE: &str = "Invalid email or password";

        let email = match normalize_email(email) {
            Ok(email) => email,
            Err(_) => return Ok(LoginOutcome::Failure(GENERIC_FAILURE.to_string())),
        };

        let Some(account) = self.accounts.find_by_email(&email).await? else {
            return Ok(LoginOutcome::Failure(GENERIC_FAILURE.to_string()));
        };

        match self.accounts.status_of(&account)? {
            AccountStatus::PendingVerification => {
                return Ok(LoginOutcome::Failure(
                    "Please verify your email address first".to_string(),
                ));
            }
            AccountStatus::Locked => {
                return Ok(LoginOutcome::Locked(
                    "Account is locked. Check your email for the unlock link.".to_string(),
                ));
            }
            AccountStatus::Dormant => {
                return Ok(LoginOutcome::Dormant(
                    "Account is dormant. Check your email for the reactivation link.".to_string(),
                ));
            }
            AccountStatus::Active => {
                if self
                    .accounts
                    .is_past_dormancy(&account, self.config.authentication.dormancy_days)
                {
                    return Ok(self.transition_to_dormant(&account).await?);
                }
            }
            AccountStatus::PendingProfile => {}
        }

        let Some(hash) = account.password_hash.as_deref() else {
            // Provider-linked account: password login is never valid
            return Ok(LoginOutcome::Failure(GENERIC_FAILURE.to_string()));
        };

        if !password::verify_password(password_input, hash)? {
            let failures = self.accounts.record_login_failure(&account.id).await?;

            if failures >= i64::from(self.config.authentication.lockout_threshold) {
                return Ok(self.transition_to_locked(&account).await?);
            }

            return Ok(LoginOutcome::Failure(GENERIC_FAILURE.to_string()));
        }

        self.accounts.record_login_success(&account.id).await?;
        let account = self.accounts.get_account(&account.id).await?;

        if self.accounts.status_of(&account)? == AccountStatus::PendingProfile {
            Ok(LoginOutcome::NeedsProfile(account))
        } else {
            Ok(LoginOutcome::Success(account))
        }
    }

    /// Evaluate a provider login. First sight of a (provider, external_id)
    /// pair creates the account in PENDING_PROFILE.
    pub async fn login_with_provider(
        &self,
        provider: AuthProvider,
        external_id: &str,
        email: Option<&str>,
    ) -> AuthResult<LoginOutcome> {
        let Some(account) = self.accounts.find_by_provider(provider, external_id).await? else {
            let account = self
                .accounts
                .create_provider_account(provider, external_id, email)
                .await?;
            self.accounts.record_login_success(&account.id).await?;
            tracing::info!(account_id = %account.id, provider = provider.as_str(), "provider account created");
            return Ok(LoginOutcome::NeedsProfile(account));
        };

        match self.accounts.status_of(&account)? {
            AccountStatus::Locked => Ok(LoginOutcome::Locked(
                "Account is locked. Check your email for the unlock link.".to_string(),
            )),
            AccountStatus::Dormant => Ok(LoginOutcome::Dormant(
                "Account is dormant. Check your email for the reactivation link.".to_string(),
            )),
            AccountStatus::Active => {
                if self
                    .accounts
                    .is_past_dormancy(&account, self.config.authentication.dormancy_days)
                {
                    return Ok(self.transition_to_dormant(&account).await?);
                }
                self.accounts.record_login_success(&account.id).await?;
                let account = self.accounts.get_account(&account.id).await?;
                Ok(LoginOutcome::Success(account))
            }
            AccountStatus::PendingProfile | AccountStatus::PendingVerification => {
                self.accounts.record_login_success(&account.id).await?;
                let account = self.accounts.get_account(&account.id).await?;
                Ok(LoginOutcome::NeedsProfile(account))
            }
        }
    }

    /// Issue a PASSWORD_RESET token and attempt delivery.
    ///
    /// Fails for unknown emails; the public HTTP boundary masks that result
    /// with a success-shaped response to prevent account enumeration. The
    /// asymmetry lives in the handler, not here.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<bool> {
        let email = normalize_email(email)?;

        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AuthError::NotFound("Account not found".to_string()))?;

        if account.password_hash.is_none() {
            return Err(AuthError::Validation(
                "Account signs in with an external provider".to_string(),
            ));
        }

        self.send_verification(&email, TokenPurpose::PasswordReset).await
    }

    /// Complete a password reset with a PASSWORD_RESET, UNLOCK, or
    /// REACTIVATE token. A LOCKED or DORMANT account explicitly returns to
    /// ACTIVE here, never at token verification. All sessions are revoked.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        // Policy first, so a bad password does not burn the token
        password::check_policy(new_password)?;

        let record = self.tokens.consume(token).await?;

        let purpose = TokenPurpose::parse(&record.purpose)
            .ok_or_else(|| AuthError::Internal(format!("Unknown token purpose: {}", record.purpose)))?;
        if purpose == TokenPurpose::Signup {
            return Err(AuthError::TokenInvalid);
        }

        let account = self
            .accounts
            .find_by_email(&record.email)
            .await?
            .ok_or_else(|| AuthError::NotFound("Account not found".to_string()))?;

        let password_hash = password::hash_password(new_password)?;
        self.accounts.set_password_hash(&account.id, &password_hash).await?;

        // Completing the reset is what lifts a lock or dormancy
        match self.accounts.status_of(&account)? {
            AccountStatus::Locked => {
                self.accounts.set_status(&account.id, AccountStatus::Active).await?;
                self.accounts.reset_failed_logins(&account.id).await?;
                tracing::info!(account_id = %account.id, "account unlocked via password reset");
            }
            AccountStatus::Dormant => {
                self.accounts.set_status(&account.id, AccountStatus::Active).await?;
                // Restart the inactivity clock, or the next login would
                // flip the account straight back to dormant
                self.accounts.record_login_success(&account.id).await?;
                tracing::info!(account_id = %account.id, "account reactivated via password reset");
            }
            _ => {}
        }

        self.sessions.revoke_all(&account.id).await?;

        tracing::info!(account_id = %account.id, "password reset completed");

        Ok(())
    }

    /// Change the password of a logged-in account. Other sessions are
    /// revoked; the caller keeps its own by logging in again or holding its
    /// access token until expiry.
    pub async fn change_password(
        &self,
        account_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let account = self.accounts.get_account(account_id).await?;

        let Some(hash) = account.password_hash.as_deref() else {
            return Err(AuthError::Validation(
                "Account signs in with an external provider".to_string(),
            ));
        };

        if !password::verify_password(old_password, hash)? {
            return Err(AuthError::Authentication("Current password is incorrect".to_string()));
        }

        password::check_policy(new_password)?;

        let password_hash = password::hash_password(new_password)?;
        self.accounts.set_password_hash(account_id, &password_hash).await?;
        self.sessions.revoke_all(account_id).await?;

        tracing::info!(account_id, "password changed");

        Ok(())
    }

    /// Lockout transition: flip to LOCKED, end every session, email the
    /// unlock link.
    async fn transition_to_locked(&self, account: &Account) -> AuthResult<LoginOutcome> {
        self.accounts.set_status(&account.id, AccountStatus::Locked).await?;
        self.sessions.revoke_all(&account.id).await?;

        if let Some(email) = account.email.as_deref() {
            self.send_verification(email, TokenPurpose::Unlock).await?;
        }

        tracing::warn!(account_id = %account.id, "account locked after repeated failed logins");

        Ok(LoginOutcome::Locked(
            "Too many failed attempts. Account is locked; check your email for the unlock link."
                .to_string(),
        ))
    }

    /// Dormancy transition, detected at login time
    async fn transition_to_dormant(&self, account: &Account) -> AuthResult<LoginOutcome> {
        self.accounts.set_status(&account.id, AccountStatus::Dormant).await?;

        if let Some(email) = account.email.as_deref() {
            self.send_verification(email, TokenPurpose::Reactivate).await?;
        }

        tracing::info!(account_id = %account.id, "account went dormant");

        Ok(LoginOutcome::Dormant(
            "Account is dormant after long inactivity. Check your email for the reactivation link."
                .to_string(),
        ))
    }

    /// Issue a token for (email, purpose) and attempt delivery
    async fn send_verification(&self, email: &str, purpose: TokenPurpose) -> AuthResult<bool> {
        let token = self.tokens.issue(email, purpose).await?;
        let base_url = &self.config.service.public_url;

        let delivered = match purpose {
            TokenPurpose::Signup => self.mailer.send_signup_email(email, &token, base_url).await,
            TokenPurpose::PasswordReset => {
                self.mailer.send_password_reset_email(email, &token, base_url).await
            }
            TokenPurpose::Unlock => self.mailer.send_unlock_email(email, &token, base_url).await,
            TokenPurpose::Reactivate => {
                self.mailer.send_reactivate_email(email, &token, base_url).await
            }
        };

        Ok(delivered)
    }
}

/// Minimal shape check and normalization for email addresses
fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_lowercase();

    if email.is_empty() || !email.contains('@') || email.len() > 254 {
        return Err(AuthError::Validation("Invalid email format".to_string()));
    }

    Ok(email)
}
