//! Admin handlers

use axum::extract::{Extension, Json, Query};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::auth::extractors::AdminUser;
use crate::common::helpers::safe_phone_log;
use crate::common::{ApiError, AppState};
use crate::services::users;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// POST /api/admin/verify
/// Probe endpoint for the admin frontend: succeeds only when the
/// bearer token belongs to the configured administrator.
pub async fn verify_admin(admin: AdminUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "isAdmin": true,
        "userId": admin.0.id,
    }))
}

/// GET /api/admin/users?page=1&pageSize=10
/// Paginated user listing with aggregate statistics.
pub async fn get_users(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    _admin: AdminUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    let page = params
        .get("page")
        .and_then(|p| p.parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1);
    let page_size = params
        .get("pageSize")
        .and_then(|p| p.parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);

    let (user_list, statistics) = users::list_users(&state.db, page, page_size).await?;
    let total = statistics.total;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "users": user_list,
            "statistics": statistics,
            "pagination": {
                "page": page,
                "pageSize": page_size,
                "total": total,
            },
        },
    })))
}

/// Request body for setting a user's phone/password credential
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetPhonePasswordPayload {
    pub user_id: String,
    pub phone_number: String,
    pub password: String,
}

/// POST /api/admin/set-phone-password
/// Provision (or replace) a user's phone + password credential.
pub async fn set_phone_password(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
    Json(payload): Json<SetPhonePasswordPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    if payload.password.len() < 6 {
        return Err(ApiError::BadRequest(
            "password must be at least 6 characters".to_string(),
        ));
    }
    if payload.phone_number.trim().is_empty() {
        return Err(ApiError::BadRequest("phone number is required".to_string()));
    }

    users::set_phone_password(
        &state.db,
        &payload.user_id,
        &payload.phone_number,
        &payload.password,
    )
    .await?;

    info!(
        admin_id = %admin.0.id,
        user_id = %payload.user_id,
        phone = %safe_phone_log(&payload.phone_number),
        "Administrator set phone/password credential"
    );

    Ok(Json(serde_json::json!({ "success": true })))
}
