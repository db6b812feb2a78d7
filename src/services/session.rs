// src/services/session.rs
//! Session registry.
//!
//! Persists token → user grants so an otherwise stateless token can be
//! revoked before its natural expiry. Expired rows are never purged
//! here; liveness lookups filter on the expiry instead of assuming
//! physical absence.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::auth::models::Session;
use crate::common::error::AuthError;
use crate::common::helpers::safe_token_log;
use crate::common::id_generator::generate_session_id;
use crate::services::token::token_lifetime;

pub struct SessionService {
    db: SqlitePool,
}

impl SessionService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Persist a session for an issued token. Failure here is fatal to
    /// the login attempt: an unregistered token could never be
    /// revoked.
    pub async fn create(
        &self,
        user_id: &str,
        token: &str,
        device_info: Option<&str>,
    ) -> Result<String, AuthError> {
        let id = generate_session_id();
        let now = Utc::now();
        let expires_at = now + token_lifetime();

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token, device_info, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(token)
        .bind(device_info)
        .bind(expires_at)
        .bind(now)
        .execute(&self.db)
        .await?;

        info!(session_id = %id, user_id, "Session created");
        Ok(id)
    }

    /// Return the owning user id for a live session, or `NotFound`
    /// when no row matches or the match has expired.
    pub async fn find_live(&self, token: &str) -> Result<String, AuthError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.db)
            .await?;

        match session {
            Some(s) if s.expires_at > Utc::now() => Ok(s.user_id),
            Some(_) => {
                debug!(token = %safe_token_log(token), "Session found but expired");
                Err(AuthError::NotFound)
            }
            None => Err(AuthError::NotFound),
        }
    }

    /// Delete the session for a token. Revoking a token with no
    /// session is not an error (idempotent sign-out).
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.db)
            .await?;

        debug!(
            token = %safe_token_log(token),
            deleted = result.rows_affected(),
            "Session revoked"
        );
        Ok(())
    }
}
