// Error handling types for the auth center

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Core error taxonomy shared by every service component.
///
/// These kinds carry no HTTP semantics; the request layer maps them
/// onto status codes via `ApiError`.
#[derive(Debug, Error)]
pub enum AuthError {
    /// WeChat answered with a non-zero errcode.
    #[error("provider rejected the request: {code} {message}")]
    ProviderRejected { code: i64, message: String },

    /// WeChat could not be reached or did not answer.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Neither response location carried a union id, so the identity
    /// cannot be linked across surfaces.
    #[error("no union id in provider response")]
    MissingUnionId,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error("failed to hash password: {0}")]
    Hashing(bcrypt::BcryptError),

    #[error("token signature invalid")]
    SignatureInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("token malformed")]
    Malformed,

    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,
}

/// API error types produced by the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    InternalServer(String),
    ServiceUnavailable(String),
    DatabaseError(sqlx::Error),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            ApiError::DatabaseError(e) => write!(f, "Database Error: {}", e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ProviderRejected { code, message } => ApiError::BadRequest(format!(
                "wechat rejected the request ({}): {}",
                code, message
            )),
            AuthError::ProviderUnavailable(msg) => {
                ApiError::ServiceUnavailable(format!("wechat unreachable: {}", msg))
            }
            AuthError::MissingUnionId => ApiError::BadRequest(
                "no union id returned; make sure the app is bound to the open platform".to_string(),
            ),
            AuthError::Store(e) => ApiError::DatabaseError(e),
            AuthError::Signing(e) => {
                ApiError::InternalServer(format!("token signing failed: {}", e))
            }
            AuthError::Hashing(e) => {
                ApiError::InternalServer(format!("password hashing failed: {}", e))
            }
            AuthError::SignatureInvalid => ApiError::Unauthorized("invalid token".to_string()),
            AuthError::TokenExpired => ApiError::Unauthorized("token expired".to_string()),
            AuthError::Malformed => ApiError::BadRequest("malformed token".to_string()),
            AuthError::NotFound => ApiError::NotFound("not found".to_string()),
            AuthError::Forbidden => ApiError::Forbidden("forbidden".to_string()),
        }
    }
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message, code) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN"),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            ApiError::InternalServer(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "INTERNAL_SERVER_ERROR",
            ),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE",
            ),
            ApiError::DatabaseError(e) => {
                error!(error = %e, "Database error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                    "DATABASE_ERROR",
                )
            }
        };

        let error_response = ErrorResponse {
            success: false,
            error: error_message,
            code: code.to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// True when the error is a unique-constraint violation from the store.
///
/// The identity resolver uses this to turn a lost insert race into the
/// found case instead of surfacing a duplicate-key error.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
