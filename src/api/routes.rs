/// Auth endpoints
use crate::{
    account::{
        AccountStatus, AuthSession, ChangePasswordRequest, LoginOutcome, LoginRequest,
        LogoutRequest, RefreshSessionRequest, RegisterRequest, RegisterResponse,
        RequestPasswordResetRequest, ResendVerificationRequest, ResetPasswordRequest, SessionInfo,
        SetProfileRequest, VerifyTokenRequest,
    },
    auth::AuthContext,
    context::AppContext,
    db::models::Account,
    error::{AuthError, AuthResult},
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_session))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/request-password-reset", post(request_password_reset))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/change-password", post(change_password))
        .route("/auth/profile", post(set_profile))
        .route("/auth/session", get(get_session))
}

/// Register a new password account
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<Json<RegisterResponse>> {
    let (account, delivered) = ctx.credentials.register(&req.email, &req.password).await?;

    Ok(Json(RegisterResponse {
        account_id: account.id,
        email: account.email.unwrap_or(req.email),
        verification_email_sent: delivered,
    }))
}

/// Consume a verification token (signup, unlock, reactivate)
async fn verify_email(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyTokenRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let record = ctx.credentials.verify_token(&req.token).await?;

    Ok(Json(json!({
        "status": "ok",
        "purpose": record.purpose,
    })))
}

/// Reissue the signup verification email.
/// Always success-shaped so the endpoint cannot be used to probe which
/// emails are registered.
async fn resend_verification(
    State(ctx): State<AppContext>,
    Json(req): Json<ResendVerificationRequest>,
) -> Json<serde_json::Value> {
    match ctx.credentials.resend_signup_email(&req.email).await {
        Ok(delivered) => {
            tracing::debug!(delivered, "verification email resent");
        }
        Err(e) => {
            tracing::debug!("resend verification suppressed: {}", e);
        }
    }

    Json(json!({ "status": "ok" }))
}

/// Password login
async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<AuthSession>> {
    let outcome = ctx.credentials.login(&req.email, &req.password).await?;

    let (account, profile_setup_required) = match outcome {
        LoginOutcome::Success(account) => (account, false),
        LoginOutcome::NeedsProfile(account) => (account, true),
        LoginOutcome::Failure(reason) => return Err(AuthError::Authentication(reason)),
        LoginOutcome::Locked(reason) => return Err(AuthError::Locked(reason)),
        LoginOutcome::Dormant(reason) => return Err(AuthError::Dormant(reason)),
    };

    let session = build_session(&ctx, account, profile_setup_required).await?;

    Ok(Json(session))
}

/// Exchange a refresh token for a new session pair
async fn refresh_session(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshSessionRequest>,
) -> AuthResult<Json<AuthSession>> {
    let (account_id, tokens) = ctx.sessions.refresh(&req.refresh_token).await?;
    let account = ctx.accounts.get_account(&account_id).await?;

    let status = ctx.accounts.status_of(&account)?;

    Ok(Json(AuthSession {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        account_id: account.id,
        display_name: account.display_name,
        status,
        profile_setup_required: status == AccountStatus::PendingProfile,
    }))
}

/// End the current session: revoke the refresh token and blacklist the
/// presented access token for the rest of its lifetime
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<LogoutRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.sessions.revoke(&req.refresh_token).await?;
    ctx.sessions
        .blacklist_access_token(&auth.access_token, auth.expires_at)
        .await?;

    Ok(Json(json!({ "status": "ok" })))
}

/// "Log out everywhere": revoke every session for the account
async fn logout_all(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuthResult<Json<serde_json::Value>> {
    let revoked = ctx.sessions.revoke_all(&auth.account_id).await?;
    ctx.sessions
        .blacklist_access_token(&auth.access_token, auth.expires_at)
        .await?;

    Ok(Json(json!({ "status": "ok", "sessionsRevoked": revoked })))
}

/// Request a password reset email.
/// Always success-shaped, even for unknown emails, to prevent account
/// enumeration; the internal result is only logged.
async fn request_password_reset(
    State(ctx): State<AppContext>,
    Json(req): Json<RequestPasswordResetRequest>,
) -> Json<serde_json::Value> {
    match ctx.credentials.request_password_reset(&req.email).await {
        Ok(delivered) => {
            tracing::debug!(delivered, "password reset email requested");
        }
        Err(e) => {
            tracing::debug!("password reset request suppressed: {}", e);
        }
    }

    Json(json!({ "status": "ok" }))
}

/// Complete a password reset (also the unlock/reactivate completion step)
async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.credentials
        .reset_password(&req.token, &req.new_password)
        .await?;

    Ok(Json(json!({ "status": "ok" })))
}

/// Change password while logged in
async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.credentials
        .change_password(&auth.account_id, &req.old_password, &req.new_password)
        .await?;

    Ok(Json(json!({ "status": "ok" })))
}

/// Set the display name; the first set activates a pending-profile account
async fn set_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<SetProfileRequest>,
) -> AuthResult<Json<SessionInfo>> {
    let account = ctx
        .accounts
        .set_display_name(&auth.account_id, &req.display_name)
        .await?;

    session_info(&ctx, account).map(Json)
}

/// Current session/account info
async fn get_session(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuthResult<Json<SessionInfo>> {
    let account = ctx.accounts.get_account(&auth.account_id).await?;

    session_info(&ctx, account).map(Json)
}

/// Mint a session pair and assemble the wire response
async fn build_session(
    ctx: &AppContext,
    account: Account,
    profile_setup_required: bool,
) -> AuthResult<AuthSession> {
    let tokens = ctx.sessions.issue_session(&account.id).await?;
    let status = ctx.accounts.status_of(&account)?;

    Ok(AuthSession {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        account_id: account.id,
        display_name: account.display_name,
        status,
        profile_setup_required,
    })
}

fn session_info(ctx: &AppContext, account: Account) -> AuthResult<SessionInfo> {
    let status = ctx.accounts.status_of(&account)?;

    Ok(SessionInfo {
        account_id: account.id,
        email: account.email,
        display_name: account.display_name,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::AccountManager,
        config::ServerConfig,
        credential::{CredentialService, VerificationTokenStore},
        db::testing::memory_pool,
        mailer::Mailer,
        session::SessionTokenService,
    };
    use std::sync::Arc;

    async fn test_ctx() -> AppContext {
        let db = memory_pool().await;
        let config = Arc::new(ServerConfig::for_tests());

        let accounts = Arc::new(AccountManager::new(db.clone()));
        let verification_tokens = Arc::new(VerificationTokenStore::new(
            db.clone(),
            config.authentication.verification_token_ttl_minutes,
        ));
        let sessions = Arc::new(SessionTokenService::new(db.clone(), config.clone()));
        let mailer = Arc::new(Mailer::new(None).unwrap());
        let credentials = Arc::new(CredentialService::new(
            accounts.clone(),
            verification_tokens.clone(),
            sessions.clone(),
            mailer.clone(),
            config.clone(),
        ));

        AppContext {
            config,
            db,
            accounts,
            verification_tokens,
            credentials,
            sessions,
            mailer,
        }
    }

    #[tokio::test]
    async fn test_password_reset_request_is_success_shaped_for_unknown_email() {
        let ctx = test_ctx().await;

        let Json(body) = request_password_reset(
            State(ctx),
            Json(RequestPasswordResetRequest {
                email: "unknown@example.com".to_string(),
            }),
        )
        .await;

        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_resend_verification_is_success_shaped_for_unknown_email() {
        let ctx = test_ctx().await;

        let Json(body) = resend_verification(
            State(ctx),
            Json(ResendVerificationRequest {
                email: "unknown@example.com".to_string(),
            }),
        )
        .await;

        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_login_handler_flags_pending_profile() {
        let ctx = test_ctx().await;

        ctx.credentials
            .register("pp@example.com", "password123")
            .await
            .unwrap();
        let token: String = sqlx::query_scalar(
            "SELECT token FROM verification_token WHERE email = 'pp@example.com' AND consumed = 0",
        )
        .fetch_one(&ctx.db)
        .await
        .unwrap();
        ctx.credentials.verify_token(&token).await.unwrap();

        let Json(session) = login(
            State(ctx.clone()),
            Json(LoginRequest {
                email: "pp@example.com".to_string(),
                password: "password123".to_string(),
            }),
        )
        .await
        .unwrap();

        assert!(session.profile_setup_required);
        assert_eq!(session.status, AccountStatus::PendingProfile);
        assert!(session.display_name.is_none());

        // The issued pair round-trips through the refresh handler
        let Json(refreshed) = refresh_session(
            State(ctx),
            Json(RefreshSessionRequest {
                refresh_token: session.refresh_token,
            }),
        )
        .await
        .unwrap();
        assert_eq!(refreshed.account_id, session.account_id);
    }

    #[tokio::test]
    async fn test_login_handler_rejects_wrong_password() {
        let ctx = test_ctx().await;

        ctx.credentials
            .register("wp@example.com", "password123")
            .await
            .unwrap();

        let result = login(
            State(ctx),
            Json(LoginRequest {
                email: "wp@example.com".to_string(),
                password: "wrongpass1".to_string(),
            }),
        )
        .await;

        match result {
            Err(AuthError::Authentication(_)) => {}
            other => panic!("Expected Authentication error, got {:?}", other.map(|_| ())),
        }
    }
}
