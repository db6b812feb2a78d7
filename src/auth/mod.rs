//! # Auth Module
//!
//! This module handles the authentication surface of the identity
//! broker:
//! - WeChat OAuth login (QR-code and in-app flows)
//! - Token verification and session-backed revocation
//! - Phone/password fallback login
//! - AuthedUser / AdminUser extractors for protected routes

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;


pub use extractors::{AdminUser, AuthedUser};
pub use models::User;
pub use routes::auth_routes;
