use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background maintenance
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::token_sweep_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Sweep expired tokens (runs every hour). Deletions key purely on
    /// expiry comparisons, so the job is idempotent and safe alongside
    /// foreground traffic.
    async fn token_sweep_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600)); // Every hour

        loop {
            interval.tick().await;
            info!("Running expired token sweep");

            match tasks::purge_expired_sessions(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Purged {} expired session rows (refresh tokens + blacklist)", count);
                    }
                }
                Err(e) => error!("Failed to purge expired session rows: {}", e),
            }

            match tasks::purge_expired_verification_tokens(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Purged {} expired verification tokens", count);
                    }
                }
                Err(e) => error!("Failed to purge expired verification tokens: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300)); // Every 5 minutes

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success - health is good
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}
