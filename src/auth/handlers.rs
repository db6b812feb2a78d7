//! Authentication handlers

use axum::extract::{Extension, Json, Query};
use axum::http::HeaderMap;
use axum::response::Redirect;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::extractors::AuthedUser;
use super::models::{PasswordLoginPayload, User, VerifyTokenPayload, WeChatLoginPayload};
use crate::common::error::AuthError;
use crate::common::{safe_token_log, ApiError, AppState};
use crate::services::callback::is_allowed_callback;
use crate::services::wechat::LoginSurface;

const WECHAT_QR_AUTHORIZE_URL: &str = "https://open.weixin.qq.com/connect/qrconnect";
const WECHAT_MP_AUTHORIZE_URL: &str = "https://open.weixin.qq.com/connect/oauth2/authorize";

/// POST /api/auth/wechat
/// Completes a WeChat login by exchanging the authorization code
///
/// # Request Body
/// ```json
/// {
///   "code": "<authorization code>",
///   "type": "mp" | "open"
/// }
/// ```
pub async fn wechat_login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<WeChatLoginPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    info!(surface = payload.surface.as_str(), "Received WeChat login request");

    let outcome = state
        .login_service
        .login(&payload.code, payload.surface)
        .await?;

    info!(
        user_id = %outcome.user_id,
        token = %safe_token_log(&outcome.token),
        "WeChat login successful"
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "token": outcome.token,
        "userId": outcome.user_id,
    })))
}

/// GET /api/auth/wechat
/// Starts the OAuth dance: validates the requested callback URL, then
/// redirects to the authorize page matching the caller's browser —
/// the official-account flow inside the WeChat app, the QR-code flow
/// everywhere else. The callback URL rides along in `state`.
pub async fn wechat_login_redirect(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, ApiError> {
    let state = state_lock.read().await.clone();

    let callback_url = params
        .get("callbackUrl")
        .cloned()
        .unwrap_or_else(|| "/".to_string());

    if !is_allowed_callback(&callback_url, &state.config.allowed_callback_domains) {
        warn!(%callback_url, "Rejected callback URL outside the allowed domain list");
        return Err(ApiError::BadRequest(
            "callback URL is not in the allowed domain list".to_string(),
        ));
    }

    // Prefer X-Forwarded-Host: the service usually sits behind a proxy.
    let host = header_value(&headers, "x-forwarded-host")
        .or_else(|| header_value(&headers, "host"))
        .map(strip_port)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());

    let user_agent = header_value(&headers, "user-agent").unwrap_or_default();

    let authorize_url = if is_wechat_browser(&user_agent) {
        if state.config.wechat_mp_app_id.is_empty() {
            return Err(ApiError::InternalServer(
                "official account configuration missing".to_string(),
            ));
        }
        let redirect_uri = format!("https://{}/api/auth/wechat/mp-redirect", host);
        format!(
            "{}?appid={}&redirect_uri={}&response_type=code&scope=snsapi_userinfo&state={}#wechat_redirect",
            WECHAT_MP_AUTHORIZE_URL,
            state.config.wechat_mp_app_id,
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(&callback_url),
        )
    } else {
        if state.config.wechat_app_id.is_empty() {
            return Err(ApiError::InternalServer(
                "open platform configuration missing".to_string(),
            ));
        }
        let redirect_uri = format!("https://{}/api/auth/wechat/open-platform-redirect", host);
        format!(
            "{}?appid={}&redirect_uri={}&response_type=code&scope=snsapi_login&state={}#wechat_redirect",
            WECHAT_QR_AUTHORIZE_URL,
            state.config.wechat_app_id,
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(&callback_url),
        )
    };

    info!(%host, "Redirecting to WeChat authorize page");
    Ok(Redirect::to(&authorize_url))
}

/// GET /api/auth/wechat/mp-redirect
/// Receives the official-account callback and bounces the code to the
/// frontend URL carried in `state`.
pub async fn wechat_mp_redirect(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, ApiError> {
    let state = state_lock.read().await.clone();
    bounce_provider_callback(
        &params,
        LoginSurface::OfficialAccount,
        &state.config.allowed_callback_domains,
    )
}

/// GET /api/auth/wechat/open-platform-redirect
/// Receives the open-platform callback and bounces the code to the
/// frontend URL carried in `state`.
pub async fn wechat_open_platform_redirect(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, ApiError> {
    let state = state_lock.read().await.clone();
    bounce_provider_callback(
        &params,
        LoginSurface::OpenPlatform,
        &state.config.allowed_callback_domains,
    )
}

fn bounce_provider_callback(
    params: &HashMap<String, String>,
    surface: LoginSurface,
    allowed_domains: &[String],
) -> Result<Redirect, ApiError> {
    let code = params
        .get("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing authorization code".to_string()))?;

    let callback_url = params
        .get("state")
        .filter(|s| !s.is_empty())
        .map(String::as_str)
        .unwrap_or("/admin/dashboard");

    // `state` comes back from the client untouched, so this endpoint
    // can be hit directly with a crafted value; it gets the same
    // allow-list treatment as the initial request.
    if !is_safe_bounce_target(callback_url, allowed_domains) {
        warn!(%callback_url, "Rejected bounce target outside the allowed domain list");
        return Err(ApiError::BadRequest(
            "callback URL is not in the allowed domain list".to_string(),
        ));
    }

    let separator = if callback_url.contains('?') { '&' } else { '?' };
    let redirect_url = format!(
        "{}{}code={}&type={}",
        callback_url,
        separator,
        urlencoding::encode(code),
        surface.as_str()
    );

    Ok(Redirect::to(&redirect_url))
}

/// POST /api/auth/verify
/// Verifies a token and returns its user when the session is live
pub async fn verify_token_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<VerifyTokenPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    let user = state
        .login_service
        .verify_and_fetch_user(&payload.token)
        .await
        .map_err(|e| match e {
            AuthError::NotFound => ApiError::Unauthorized("session expired".to_string()),
            other => ApiError::from(other),
        })?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "userId": user.id,
            "unionId": user.union_id,
        },
    })))
}

/// POST /api/auth/password-login
/// Phone number + password login
pub async fn password_login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<PasswordLoginPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    let outcome = state
        .login_service
        .password_login(&payload.phone_number, &payload.password)
        .await
        .map_err(|e| match e {
            AuthError::Forbidden => {
                ApiError::Unauthorized("phone number or password incorrect".to_string())
            }
            AuthError::NotFound => ApiError::NotFound("user not found".to_string()),
            other => ApiError::from(other),
        })?;

    info!(user_id = %outcome.user_id, "Password login successful");

    Ok(Json(serde_json::json!({
        "success": true,
        "token": outcome.token,
        "userId": outcome.user_id,
    })))
}

/// POST /api/auth/logout
/// Revokes the session behind the bearer token. Idempotent.
pub async fn logout_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    let token = header_value(&headers, "authorization")
        .ok_or_else(|| ApiError::BadRequest("missing authorization token".to_string()))?;
    let bare_token = token.strip_prefix("Bearer ").unwrap_or(&token);

    state.login_service.logout(bare_token).await?;

    info!(token = %safe_token_log(bare_token), "User signed out");
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/me
/// Returns the current authenticated user's information
pub async fn me_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&authed.id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "user": user,
            "isAdmin": authed.is_admin,
        },
    })))
}

// ---- Helper Functions ----

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

fn strip_port(host: String) -> String {
    host.split(':').next().unwrap_or("").to_string()
}

/// Same-origin relative paths are always safe bounce targets; absolute
/// URLs go through the allow-list. Protocol-relative URLs (`//host`)
/// count as absolute.
fn is_safe_bounce_target(url: &str, allowed_domains: &[String]) -> bool {
    if url.starts_with('/') && !url.starts_with("//") {
        return true;
    }
    is_allowed_callback(url, allowed_domains)
}

/// Detects the WeChat in-app browser (and WeCom) from the User-Agent.
fn is_wechat_browser(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    ua.contains("micromessenger") || ua.contains("wxwork") || ua.contains("wechat")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_wechat_browser() {
        assert!(is_wechat_browser(
            "Mozilla/5.0 (iPhone) MicroMessenger/8.0.40"
        ));
        assert!(is_wechat_browser("mozilla/5.0 wxwork/4.1"));
        assert!(!is_wechat_browser(
            "Mozilla/5.0 (Macintosh) Chrome/120.0 Safari/537.36"
        ));
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:8080".to_string()), "example.com");
        assert_eq!(strip_port("example.com".to_string()), "example.com");
        assert_eq!(strip_port(String::new()), "");
    }

    fn bounce_params(code: &str, state: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("code".to_string(), code.to_string());
        params.insert("state".to_string(), state.to_string());
        params
    }

    #[test]
    fn test_bounce_keeps_existing_query_string() {
        let params = bounce_params("CODE1", "https://app.example.com/done?tab=1");
        let allowed = vec!["*.example.com".to_string()];
        let redirect = bounce_provider_callback(&params, LoginSurface::OfficialAccount, &allowed);
        assert!(redirect.is_ok());
    }

    #[test]
    fn test_bounce_requires_code() {
        let mut params = HashMap::new();
        params.insert("state".to_string(), "/".to_string());
        let err = bounce_provider_callback(&params, LoginSurface::OpenPlatform, &[]);
        assert!(err.is_err());
    }

    #[test]
    fn test_bounce_rejects_unlisted_absolute_state() {
        // Hitting the callback endpoint directly with a crafted state
        // must not produce a redirect off the allow-list.
        let params = bounce_params("CODE1", "https://evil.com/phish");
        let allowed = vec!["*.example.com".to_string()];
        let err = bounce_provider_callback(&params, LoginSurface::OpenPlatform, &allowed);
        assert!(err.is_err());
    }

    #[test]
    fn test_bounce_allows_relative_state_without_allow_list() {
        let params = bounce_params("CODE1", "/admin/dashboard");
        assert!(bounce_provider_callback(&params, LoginSurface::OfficialAccount, &[]).is_ok());
    }

    #[test]
    fn test_protocol_relative_state_is_not_same_origin() {
        assert!(!is_safe_bounce_target("//evil.com/phish", &[]));
        assert!(is_safe_bounce_target("/admin/dashboard", &[]));
        assert!(!is_safe_bounce_target("https://evil.com", &[]));
    }
}
