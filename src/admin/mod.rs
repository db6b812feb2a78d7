//! # Admin Module
//!
//! Administrator-only surface: user listing with statistics,
//! phone/password provisioning, and the admin verification probe.
//! Every route is gated behind the `AdminUser` extractor.

pub mod handlers;
pub mod routes;

pub use routes::admin_routes;
