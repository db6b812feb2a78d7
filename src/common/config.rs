// Process-wide configuration, read from the environment exactly once
// at startup and injected into services through AppState.

use std::env;

use crate::services::wechat::LoginSurface;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    /// HS256 signing secret for issued tokens.
    pub jwt_secret: String,

    /// Open-platform (QR-code login) credentials.
    pub wechat_app_id: String,
    pub wechat_app_secret: String,

    /// Official-account (in-app login) credentials.
    pub wechat_mp_app_id: String,
    pub wechat_mp_secret: String,

    /// Open id of the single privileged administrator. `None` when
    /// unconfigured; the authorization gate fails closed in that case.
    pub admin_wechat_open_id: Option<String>,

    /// Comma-separated allow-list for callback URLs. Entries are exact
    /// hostnames or `*.domain` wildcards.
    pub allowed_callback_domains: Vec<String>,

    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let allowed_callback_domains = env::var("ALLOWED_CALLBACK_DOMAINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://auth_center.db".to_string()),
            jwt_secret: env::var("AUTH_SECRET")
                .unwrap_or_else(|_| "replace_with_strong_secret".to_string()),
            wechat_app_id: env::var("WECHAT_APP_ID").unwrap_or_default(),
            wechat_app_secret: env::var("WECHAT_APP_SECRET").unwrap_or_default(),
            wechat_mp_app_id: env::var("WECHAT_MP_APPID").unwrap_or_default(),
            wechat_mp_secret: env::var("WECHAT_MP_SECRET").unwrap_or_default(),
            admin_wechat_open_id: env::var("ADMIN_WECHAT_OPENID")
                .ok()
                .filter(|s| !s.is_empty()),
            allowed_callback_domains,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// (app_id, app_secret) pair for the given OAuth surface.
    pub fn wechat_credentials(&self, surface: LoginSurface) -> (&str, &str) {
        match surface {
            LoginSurface::OpenPlatform => (&self.wechat_app_id, &self.wechat_app_secret),
            LoginSurface::OfficialAccount => (&self.wechat_mp_app_id, &self.wechat_mp_secret),
        }
    }

    /// App id for the given OAuth surface.
    pub fn wechat_app_id(&self, surface: LoginSurface) -> &str {
        self.wechat_credentials(surface).0
    }
}
