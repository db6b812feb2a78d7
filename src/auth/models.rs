//! Authentication data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::services::wechat::LoginSurface;

/// Canonical user. One row per WeChat union id; the same human logging
/// in through either OAuth surface resolves to the same row.
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub union_id: String,
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A linked external identity. Unique on
/// (user_id, provider, app_id, open_id); repeated logins through the
/// same app refresh nickname/avatar in place.
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub app_id: String,
    pub open_id: String,
    pub kind: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A live credential grant backing an issued token. Valid while the
/// row exists and `expires_at` is in the future; expired rows are
/// filtered on lookup rather than purged.
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub device_info: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// JWT claims structure
#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    /// Owning user id.
    pub sub: String,
    /// Unique token id.
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// WeChat login request body (code exchanged after the OAuth redirect)
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WeChatLoginPayload {
    pub code: String,
    #[serde(rename = "type")]
    pub surface: LoginSurface,
}

/// Phone + password login request body
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PasswordLoginPayload {
    pub phone_number: String,
    pub password: String,
}

/// Token verification request body
#[derive(Deserialize, Debug)]
pub struct VerifyTokenPayload {
    pub token: String,
}
