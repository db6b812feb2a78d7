// src/services/login.rs
//! Login orchestration.
//!
//! The single entry point the request layer consumes: code exchange →
//! profile fetch → identity resolution → token issuance → session
//! registration, plus verification and sign-out. Each provider call
//! gets one best-effort retry when WeChat is unreachable; every other
//! failure short-circuits with its kind unchanged. The only swallowed
//! failure is the last-login timestamp touch.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::models::User;
use crate::common::config::Config;
use crate::common::error::AuthError;
use crate::services::identity::{IdentityService, ProviderIdentity};
use crate::services::token::{issue_token, verify_token};
use crate::services::users::verify_password;
use crate::services::wechat::{LoginSurface, WeChatService};
use crate::services::SessionService;

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user_id: String,
    pub token: String,
}

pub struct LoginService {
    db: SqlitePool,
    config: Arc<Config>,
    wechat: Arc<WeChatService>,
    identity: Arc<IdentityService>,
    sessions: Arc<SessionService>,
}

impl LoginService {
    pub fn new(
        db: SqlitePool,
        config: Arc<Config>,
        wechat: Arc<WeChatService>,
        identity: Arc<IdentityService>,
        sessions: Arc<SessionService>,
    ) -> Self {
        Self {
            db,
            config,
            wechat,
            identity,
            sessions,
        }
    }

    /// Complete a WeChat login from an authorization code.
    pub async fn login(
        &self,
        code: &str,
        surface: LoginSurface,
    ) -> Result<LoginOutcome, AuthError> {
        let token_response = match self.wechat.exchange_code(code, surface).await {
            Err(AuthError::ProviderUnavailable(reason)) => {
                warn!(%reason, "WeChat code exchange failed, retrying once");
                self.wechat.exchange_code(code, surface).await?
            }
            other => other?,
        };

        let profile = match self
            .wechat
            .fetch_profile(&token_response.access_token, &token_response.openid, surface)
            .await
        {
            Err(AuthError::ProviderUnavailable(reason)) => {
                warn!(%reason, "WeChat profile fetch failed, retrying once");
                self.wechat
                    .fetch_profile(&token_response.access_token, &token_response.openid, surface)
                    .await?
            }
            other => other?,
        };

        let provider_identity = ProviderIdentity::from_responses(&token_response, &profile);
        let (user, _account) = self.identity.resolve(&provider_identity, surface).await?;

        self.finish_login(&user.id, None).await
    }

    /// Complete a phone + password login.
    pub async fn password_login(
        &self,
        phone_number: &str,
        password: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let user = verify_password(&self.db, phone_number, password).await?;
        self.finish_login(&user.id, None).await
    }

    /// Verify a bearer token and return its user: stateless signature
    /// and expiry check first, then session liveness, then the row.
    pub async fn verify_and_fetch_user(&self, token: &str) -> Result<User, AuthError> {
        let user_id = verify_token(token, &self.config.jwt_secret)?;
        // The session row is authoritative for revocation.
        self.sessions.find_live(token).await?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AuthError::NotFound)?;
        Ok(user)
    }

    /// Revoke the session behind a token. Idempotent.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.revoke(token).await
    }

    /// Token issuance and session registration shared by both login
    /// paths.
    async fn finish_login(
        &self,
        user_id: &str,
        device_info: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        let token = issue_token(user_id, &self.config.jwt_secret)?;
        self.sessions.create(user_id, &token, device_info).await?;

        // Best effort only: a failed timestamp update must not undo a
        // login that already has a registered session.
        if let Err(e) = self.touch_last_login(user_id).await {
            warn!(error = %e, user_id, "Failed to update last login timestamp");
        }

        info!(user_id, "Login successful");
        Ok(LoginOutcome {
            user_id: user_id.to_string(),
            token,
        })
    }

    async fn touch_last_login(&self, user_id: &str) -> Result<(), AuthError> {
        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_login_service() -> LoginService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        run_migrations(&pool).await.expect("migrations");

        let config = Arc::new(Config {
            database_url: String::new(),
            jwt_secret: "orchestrator_secret".to_string(),
            wechat_app_id: "wx_open_app".to_string(),
            wechat_app_secret: String::new(),
            wechat_mp_app_id: "wx_mp_app".to_string(),
            wechat_mp_secret: String::new(),
            admin_wechat_open_id: None,
            allowed_callback_domains: vec![],
            environment: "test".to_string(),
        });

        let http = reqwest::Client::new();
        let wechat = Arc::new(WeChatService::new(http, config.clone()));
        let identity = Arc::new(IdentityService::new(pool.clone(), config.clone()));
        let sessions = Arc::new(SessionService::new(pool.clone()));
        LoginService::new(pool, config, wechat, identity, sessions)
    }

    async fn seed_user(service: &LoginService, user_id: &str) {
        let now = Utc::now();
        sqlx::query("INSERT INTO users (id, union_id, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(user_id)
            .bind(format!("union-{}", user_id))
            .bind(now)
            .bind(now)
            .execute(&service.db)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_finish_login_then_verify_round_trip() {
        let service = test_login_service().await;
        seed_user(&service, "U_FLOW123456").await;

        let outcome = service.finish_login("U_FLOW123456", None).await.unwrap();
        assert_eq!(outcome.user_id, "U_FLOW123456");

        let user = service.verify_and_fetch_user(&outcome.token).await.unwrap();
        assert_eq!(user.id, "U_FLOW123456");
        assert!(user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_logout_revokes_even_with_valid_signature() {
        let service = test_login_service().await;
        seed_user(&service, "U_FLOW123456").await;

        let outcome = service.finish_login("U_FLOW123456", None).await.unwrap();
        service.logout(&outcome.token).await.unwrap();

        // The signature still verifies; the missing session is what
        // rejects the token.
        let err = service.verify_and_fetch_user(&outcome.token).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));

        // Signing out twice is fine.
        service.logout(&outcome.token).await.unwrap();
    }

    #[tokio::test]
    async fn test_token_without_session_is_rejected() {
        let service = test_login_service().await;
        seed_user(&service, "U_FLOW123456").await;

        let token = issue_token("U_FLOW123456", "orchestrator_secret").unwrap();
        let err = service.verify_and_fetch_user(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed() {
        let service = test_login_service().await;
        let err = service.verify_and_fetch_user("garbage").await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed));
    }
}
