//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/wechat` - WeChat code login
/// - `GET /api/auth/wechat` - Smart authorize redirect (QR vs in-app)
/// - `GET /api/auth/wechat/mp-redirect` - Official-account callback
/// - `GET /api/auth/wechat/open-platform-redirect` - Open-platform callback
/// - `POST /api/auth/verify` - Token + session verification
/// - `POST /api/auth/password-login` - Phone/password login
/// - `POST /api/auth/logout` - Session revocation
/// - `GET /api/me` - Current user information
pub fn auth_routes() -> Router {
    Router::new()
        .route(
            "/api/auth/wechat",
            get(handlers::wechat_login_redirect).post(handlers::wechat_login),
        )
        .route(
            "/api/auth/wechat/mp-redirect",
            get(handlers::wechat_mp_redirect),
        )
        .route(
            "/api/auth/wechat/open-platform-redirect",
            get(handlers::wechat_open_platform_redirect),
        )
        .route("/api/auth/verify", post(handlers::verify_token_handler))
        .route("/api/auth/password-login", post(handlers::password_login))
        .route("/api/auth/logout", post(handlers::logout_handler))
        .route("/api/me", get(handlers::me_handler))
}
