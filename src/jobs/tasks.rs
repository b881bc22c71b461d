/// Background task implementations
use crate::{context::AppContext, error::AuthResult};

/// Purge expired refresh tokens and blacklist entries.
/// Returns the total number of rows deleted.
pub async fn purge_expired_sessions(ctx: &AppContext) -> AuthResult<u64> {
    let (refresh_deleted, blacklist_deleted) = ctx.sessions.purge_expired().await?;

    Ok(refresh_deleted + blacklist_deleted)
}

/// Purge expired verification tokens, consumed or not.
/// Account rows are never touched.
pub async fn purge_expired_verification_tokens(ctx: &AppContext) -> AuthResult<u64> {
    ctx.verification_tokens.purge_expired().await
}

/// Health check - verify the store is reachable
pub async fn health_check(ctx: &AppContext) -> AuthResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    Ok(())
}
