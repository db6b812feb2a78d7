// src/services/users.rs
//! User management: password credentials and the admin listing.
//!
//! Password login is an administrator-provisioned fallback; users are
//! normally created through WeChat resolution and only gain a phone +
//! password when an administrator sets one.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::auth::models::User;
use crate::common::error::AuthError;
use crate::common::helpers::safe_phone_log;

/// Verify a phone + password pair and return the user.
///
/// Unknown phone → `NotFound`; wrong password (or a user with no
/// password credential) → `Forbidden`.
pub async fn verify_password(
    db: &SqlitePool,
    phone_number: &str,
    password: &str,
) -> Result<User, AuthError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone_number = ?")
        .bind(phone_number)
        .fetch_optional(db)
        .await?
        .ok_or(AuthError::NotFound)?;

    let hash = user.password_hash.as_deref().ok_or(AuthError::Forbidden)?;
    let matches = bcrypt::verify(password, hash).map_err(|_| AuthError::Forbidden)?;
    if !matches {
        return Err(AuthError::Forbidden);
    }

    Ok(user)
}

/// Set (or replace) a user's phone number and password credential.
pub async fn set_phone_password(
    db: &SqlitePool,
    user_id: &str,
    phone_number: &str,
    password: &str,
) -> Result<(), AuthError> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(AuthError::Hashing)?;

    let result = sqlx::query(
        "UPDATE users SET phone_number = ?, password_hash = ?, updated_at = ? WHERE id = ?",
    )
    .bind(phone_number)
    .bind(&hash)
    .bind(Utc::now())
    .bind(user_id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound);
    }

    info!(user_id, phone = %safe_phone_log(phone_number), "Phone/password credential set");
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub total: i64,
    pub with_password: i64,
    pub wechat_login: i64,
}

/// Paginated user listing with aggregate statistics.
pub async fn list_users(
    db: &SqlitePool,
    page: i64,
    page_size: i64,
) -> Result<(Vec<User>, UserStatistics), AuthError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    let with_password: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE password_hash IS NOT NULL")
            .fetch_one(db)
            .await?;
    let wechat_login: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT user_id) FROM user_accounts WHERE provider = 'wechat'",
    )
    .fetch_one(db)
    .await?;

    let offset = (page - 1) * page_size;
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(page_size)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok((
        users,
        UserStatistics {
            total,
            with_password,
            wechat_login,
        },
    ))
}
