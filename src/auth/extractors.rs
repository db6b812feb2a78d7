//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::common::error::AuthError;
use crate::common::{ApiError, AppState};
use crate::services::authz;

/// Authenticated user extractor
///
/// Validates the bearer token (signature + expiry), checks session
/// liveness so revoked tokens are rejected, and resolves the admin
/// flag through the authorization gate.
#[derive(Debug)]
pub struct AuthedUser {
    pub id: String,
    pub union_id: String,
    pub is_admin: bool,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let app_state = state_lock.read().await.clone();

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let token = match token {
            Some(t) => t,
            None => {
                warn!("Authentication failed: missing Authorization header");
                return Err(ApiError::Unauthorized("missing auth".into()));
            }
        };

        // Handle "Bearer <token>" format or raw token
        let bare_token = token.strip_prefix("Bearer ").unwrap_or(&token).to_string();

        let user = app_state
            .login_service
            .verify_and_fetch_user(&bare_token)
            .await
            .map_err(|e| match e {
                // A verified signature without a live session means the
                // grant was revoked or has lapsed.
                AuthError::NotFound => ApiError::Unauthorized("session expired".into()),
                other => {
                    warn!(error = %other, "Token verification failed");
                    ApiError::from(other)
                }
            })?;

        let is_admin = authz::is_administrator(
            &app_state.db,
            app_state.config.admin_wechat_open_id.as_deref(),
            &user.id,
        )
        .await
        .map_err(ApiError::from)?;

        debug!(user_id = %user.id, is_admin, "User authenticated via extractor");

        Ok(AuthedUser {
            id: user.id,
            union_id: user.union_id,
            is_admin,
        })
    }
}

/// Extractor for administrator-only routes. Wraps `AuthedUser` and
/// rejects with Forbidden unless the authorization gate passed.
#[derive(Debug)]
pub struct AdminUser(pub AuthedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authed = AuthedUser::from_request_parts(parts, state).await?;
        if !authed.is_admin {
            warn!(user_id = %authed.id, "Administrator access denied");
            return Err(ApiError::Forbidden("administrator access required".into()));
        }
        Ok(AdminUser(authed))
    }
}
