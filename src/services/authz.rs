// src/services/authz.rs
//! Administrator elevation.
//!
//! Exactly one WeChat open id designates the administrator. The check
//! fails closed: no configured id, or no linked wechat account, means
//! not an administrator.

use sqlx::SqlitePool;
use tracing::debug;

use crate::common::error::AuthError;

/// Whether the given user holds the administrator capability.
///
/// A user with several linked wechat accounts (one per surface) is an
/// administrator when any of their open ids matches the configured
/// one; the decision must not depend on row order.
pub async fn is_administrator(
    db: &SqlitePool,
    admin_open_id: Option<&str>,
    user_id: &str,
) -> Result<bool, AuthError> {
    let Some(admin_open_id) = admin_open_id else {
        debug!("No administrator open id configured");
        return Ok(false);
    };

    let matches: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_accounts WHERE user_id = ? AND provider = 'wechat' AND open_id = ?",
    )
    .bind(user_id)
    .bind(admin_open_id)
    .fetch_one(db)
    .await?;

    Ok(matches > 0)
}
