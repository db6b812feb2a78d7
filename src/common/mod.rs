// Common module - shared types and utilities across all modules

pub mod config;
pub mod error;
pub mod helpers;
pub mod id_generator;
pub mod migrations;
pub mod state;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::{ApiError, AuthError};
pub use helpers::{safe_phone_log, safe_token_log};
pub use id_generator::*;
pub use state::AppState;
