//! Admin routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the admin router
///
/// # Routes
/// - `POST /api/admin/verify` - Admin probe for the frontend
/// - `GET /api/admin/users` - Paginated user listing with statistics
/// - `POST /api/admin/set-phone-password` - Provision a password credential
pub fn admin_routes() -> Router {
    Router::new()
        .route("/api/admin/verify", post(handlers::verify_admin))
        .route("/api/admin/users", get(handlers::get_users))
        .route(
            "/api/admin/set-phone-password",
            post(handlers::set_phone_password),
        )
}
