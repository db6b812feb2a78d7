// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::common::config::Config;
use crate::services::LoginService;

/// Application state containing the database pool, configuration, and
/// the login orchestrator. Built once in `main` and shared via
/// Extension.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,
    pub login_service: Arc<LoginService>,
}
