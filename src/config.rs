/// Configuration management for the ScrimBase auth service
use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub sessions: SessionConfig,
    pub email: Option<EmailConfig>,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public base URL used in verification links (e.g. https://scrimbase.gg)
    pub public_url: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub auth_db: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Consecutive failed logins before the account locks
    pub lockout_threshold: u32,
    /// Days without a successful login before an account goes dormant
    pub dormancy_days: i64,
    /// Verification token lifetime in minutes
    pub verification_token_ttl_minutes: i64,
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Access token lifetime in seconds
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in days
    pub refresh_ttl_days: i64,
    /// Maximum concurrent sessions per account
    pub max_sessions: u32,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AuthResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("SCRIMBASE_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("SCRIMBASE_PORT")
            .unwrap_or_else(|_| "4100".to_string())
            .parse()
            .map_err(|_| AuthError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("SCRIMBASE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));

        let data_directory: PathBuf = env::var("SCRIMBASE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let auth_db = env::var("SCRIMBASE_AUTH_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("auth.sqlite"));

        let jwt_secret = env::var("SCRIMBASE_JWT_SECRET")
            .map_err(|_| AuthError::Validation("JWT secret required".to_string()))?;
        let lockout_threshold = env::var("SCRIMBASE_LOCKOUT_THRESHOLD")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);
        let dormancy_days = env::var("SCRIMBASE_DORMANCY_DAYS")
            .unwrap_or_else(|_| "180".to_string())
            .parse()
            .unwrap_or(180);
        let verification_token_ttl_minutes = env::var("SCRIMBASE_VERIFICATION_TOKEN_TTL_MINUTES")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);

        let access_ttl_secs = env::var("SCRIMBASE_ACCESS_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);
        let refresh_ttl_days = env::var("SCRIMBASE_REFRESH_TTL_DAYS")
            .unwrap_or_else(|_| "14".to_string())
            .parse()
            .unwrap_or(14);
        let max_sessions = env::var("SCRIMBASE_MAX_SESSIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let email = if let Ok(smtp_url) = env::var("SCRIMBASE_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("SCRIMBASE_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
            },
            storage: StorageConfig {
                data_directory,
                auth_db,
            },
            authentication: AuthConfig {
                jwt_secret,
                lockout_threshold,
                dormancy_days,
                verification_token_ttl_minutes,
            },
            sessions: SessionConfig {
                access_ttl_secs,
                refresh_ttl_days,
                max_sessions,
            },
            email,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AuthResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AuthError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AuthError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.sessions.max_sessions == 0 {
            return Err(AuthError::Validation(
                "Session limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Test configuration used by unit tests across the crate
    #[cfg(test)]
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 4100,
                public_url: "http://localhost:4100".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                auth_db: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
                lockout_threshold: 5,
                dormancy_days: 180,
                verification_token_ttl_minutes: 15,
            },
            sessions: SessionConfig {
                access_ttl_secs: 3600,
                refresh_ttl_days: 14,
                max_sessions: 5,
            },
            email: None,
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
