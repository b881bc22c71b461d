/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    credential::{CredentialService, VerificationTokenStore},
    db,
    error::AuthResult,
    mailer::Mailer,
    session::SessionTokenService,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub verification_tokens: Arc<VerificationTokenStore>,
    pub credentials: Arc<CredentialService>,
    pub sessions: Arc<SessionTokenService>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AuthResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        // Initialize the auth database
        let db = db::create_pool(&config.storage.auth_db, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let config = Arc::new(config);

        let accounts = Arc::new(AccountManager::new(db.clone()));
        let verification_tokens = Arc::new(VerificationTokenStore::new(
            db.clone(),
            config.authentication.verification_token_ttl_minutes,
        ));
        let sessions = Arc::new(SessionTokenService::new(db.clone(), config.clone()));
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        let credentials = Arc::new(CredentialService::new(
            accounts.clone(),
            verification_tokens.clone(),
            sessions.clone(),
            mailer.clone(),
            config.clone(),
        ));

        Ok(Self {
            config,
            db,
            accounts,
            verification_tokens,
            credentials,
            sessions,
            mailer,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
