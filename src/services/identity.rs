// src/services/identity.rs
//! Identity resolution.
//!
//! Maps a WeChat identity onto the canonical user. The union id is the
//! cross-application key: the open platform returns it in the token
//! exchange, the official account in the profile fetch, so extraction
//! is an explicit two-branch keyed by the surface. Users and linked
//! accounts are created on first sight; concurrent first logins are
//! serialized by the store's unique constraints, with a lost insert
//! race recovered by re-reading.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::models::{User, UserAccount};
use crate::common::config::Config;
use crate::common::error::{is_unique_violation, AuthError};
use crate::common::id_generator::{generate_account_id, generate_user_id};
use crate::services::wechat::{AccountKind, LoginSurface, WeChatProfile, WeChatTokenResponse};

const PROVIDER: &str = "wechat";

/// Everything the resolver needs from the two provider responses.
///
/// Both possible union id locations are kept; empty strings are
/// normalized to `None` so blanks never masquerade as values.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub open_id: String,
    pub exchange_union_id: Option<String>,
    pub profile_union_id: Option<String>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProviderIdentity {
    pub fn from_responses(token: &WeChatTokenResponse, profile: &WeChatProfile) -> Self {
        Self {
            open_id: token.openid.clone(),
            exchange_union_id: non_empty(token.unionid.as_deref()),
            profile_union_id: non_empty(profile.unionid.as_deref()),
            nickname: non_empty(profile.nickname.as_deref()),
            avatar_url: non_empty(profile.headimgurl.as_deref()),
        }
    }

    /// The unifying key for this login, checking the
    /// surface-appropriate response first and falling back to the
    /// other.
    pub fn union_id(&self, surface: LoginSurface) -> Option<&str> {
        let (first, second) = match surface {
            LoginSurface::OfficialAccount => (&self.profile_union_id, &self.exchange_union_id),
            LoginSurface::OpenPlatform => (&self.exchange_union_id, &self.profile_union_id),
        };
        first.as_deref().or(second.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

pub struct IdentityService {
    db: SqlitePool,
    config: Arc<Config>,
}

impl IdentityService {
    pub fn new(db: SqlitePool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Resolve a provider identity to the canonical user, creating the
    /// user and/or linked account on first sight.
    pub async fn resolve(
        &self,
        identity: &ProviderIdentity,
        surface: LoginSurface,
    ) -> Result<(User, UserAccount), AuthError> {
        let union_id = identity
            .union_id(surface)
            .ok_or(AuthError::MissingUnionId)?
            .to_string();

        let user = self.find_or_create_user(&union_id).await?;
        let app_id = self.config.wechat_app_id(surface).to_string();
        let account = self
            .link_account(&user, identity, &app_id, surface.account_kind())
            .await?;

        Ok((user, account))
    }

    /// Look up the user by union id, inserting on absence. A unique
    /// violation on insert means another request created the row
    /// first; re-read and treat it as the found case.
    async fn find_or_create_user(&self, union_id: &str) -> Result<User, AuthError> {
        if let Some(user) = self.fetch_user_by_union_id(union_id).await? {
            return Ok(user);
        }

        let id = generate_user_id();
        let now = Utc::now();

        let inserted = sqlx::query(
            "INSERT INTO users (id, union_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(union_id)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await;

        match inserted {
            Ok(_) => {
                info!(user_id = %id, "Created new user for union id");
            }
            Err(e) if is_unique_violation(&e) => {
                debug!("Lost user insert race, re-reading existing row");
            }
            Err(e) => return Err(e.into()),
        }

        let user = self
            .fetch_user_by_union_id(union_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        Ok(user)
    }

    async fn fetch_user_by_union_id(&self, union_id: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE union_id = ?")
            .bind(union_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    /// Find the linked account for (user, provider, app, open id),
    /// inserting on absence and refreshing nickname/avatar on
    /// presence. Fields the provider left blank never overwrite stored
    /// values.
    async fn link_account(
        &self,
        user: &User,
        identity: &ProviderIdentity,
        app_id: &str,
        kind: AccountKind,
    ) -> Result<UserAccount, AuthError> {
        let existing = self.fetch_account(&user.id, app_id, &identity.open_id).await?;

        let account = match existing {
            Some(account) => account,
            None => {
                let id = generate_account_id();
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO user_accounts
                        (id, user_id, provider, app_id, open_id, kind, nickname, avatar_url, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(&user.id)
                .bind(PROVIDER)
                .bind(app_id)
                .bind(&identity.open_id)
                .bind(kind.as_str())
                .bind(identity.nickname.as_deref())
                .bind(identity.avatar_url.as_deref())
                .bind(Utc::now())
                .execute(&self.db)
                .await;

                match inserted {
                    Ok(_) => {
                        info!(user_id = %user.id, app_id, "Linked new provider account");
                    }
                    Err(e) if is_unique_violation(&e) => {
                        debug!("Lost account insert race, re-reading existing row");
                    }
                    Err(e) => return Err(e.into()),
                }

                return self
                    .fetch_account(&user.id, app_id, &identity.open_id)
                    .await?
                    .ok_or(AuthError::NotFound);
            }
        };

        // Best known value wins: only non-empty fetched fields replace
        // what is stored.
        if identity.nickname.is_some() || identity.avatar_url.is_some() {
            sqlx::query(
                r#"
                UPDATE user_accounts
                SET nickname = COALESCE(?, nickname), avatar_url = COALESCE(?, avatar_url)
                WHERE id = ?
                "#,
            )
            .bind(identity.nickname.as_deref())
            .bind(identity.avatar_url.as_deref())
            .bind(&account.id)
            .execute(&self.db)
            .await?;
        }

        self.fetch_account(&user.id, app_id, &identity.open_id)
            .await?
            .ok_or(AuthError::NotFound)
    }

    async fn fetch_account(
        &self,
        user_id: &str,
        app_id: &str,
        open_id: &str,
    ) -> Result<Option<UserAccount>, AuthError> {
        let account = sqlx::query_as::<_, UserAccount>(
            "SELECT * FROM user_accounts WHERE user_id = ? AND provider = ? AND app_id = ? AND open_id = ?",
        )
        .bind(user_id)
        .bind(PROVIDER)
        .bind(app_id)
        .bind(open_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_service() -> IdentityService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        run_migrations(&pool).await.expect("migrations");
        IdentityService::new(pool, Arc::new(test_config()))
    }

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            jwt_secret: "test_secret".to_string(),
            wechat_app_id: "wx_open_app".to_string(),
            wechat_app_secret: String::new(),
            wechat_mp_app_id: "wx_mp_app".to_string(),
            wechat_mp_secret: String::new(),
            admin_wechat_open_id: None,
            allowed_callback_domains: vec![],
            environment: "test".to_string(),
        }
    }

    fn mp_identity(union_id: &str, open_id: &str, nickname: Option<&str>) -> ProviderIdentity {
        ProviderIdentity {
            open_id: open_id.to_string(),
            exchange_union_id: None,
            profile_union_id: Some(union_id.to_string()),
            nickname: nickname.map(str::to_string),
            avatar_url: Some("http://wx.example/avatar.png".to_string()),
        }
    }

    #[test]
    fn test_union_id_extraction_prefers_surface_location() {
        let both = ProviderIdentity {
            open_id: "O1".to_string(),
            exchange_union_id: Some("FROM_EXCHANGE".to_string()),
            profile_union_id: Some("FROM_PROFILE".to_string()),
            nickname: None,
            avatar_url: None,
        };
        assert_eq!(both.union_id(LoginSurface::OpenPlatform), Some("FROM_EXCHANGE"));
        assert_eq!(both.union_id(LoginSurface::OfficialAccount), Some("FROM_PROFILE"));

        // Fallback to the other location when the preferred one is absent.
        let only_exchange = ProviderIdentity {
            exchange_union_id: Some("U1".to_string()),
            profile_union_id: None,
            ..both.clone()
        };
        assert_eq!(only_exchange.union_id(LoginSurface::OfficialAccount), Some("U1"));

        let neither = ProviderIdentity {
            exchange_union_id: None,
            profile_union_id: None,
            ..both
        };
        assert_eq!(neither.union_id(LoginSurface::OpenPlatform), None);
    }

    #[test]
    fn test_blank_provider_fields_normalize_to_none() {
        let token = WeChatTokenResponse {
            openid: "O1".to_string(),
            unionid: Some(String::new()),
            ..Default::default()
        };
        let profile = WeChatProfile {
            openid: "O1".to_string(),
            nickname: Some(String::new()),
            unionid: Some("U1".to_string()),
            ..Default::default()
        };
        let identity = ProviderIdentity::from_responses(&token, &profile);
        assert_eq!(identity.exchange_union_id, None);
        assert_eq!(identity.nickname, None);
        assert_eq!(identity.profile_union_id.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn test_resolve_without_union_id_fails() {
        let service = test_service().await;
        let identity = ProviderIdentity {
            open_id: "O1".to_string(),
            exchange_union_id: None,
            profile_union_id: None,
            nickname: None,
            avatar_url: None,
        };
        let err = service
            .resolve(&identity, LoginSurface::OfficialAccount)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingUnionId));

        // The hard precondition must not leave an orphan user behind.
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&service.db)
            .await
            .unwrap();
        assert_eq!(users, 0);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_per_union_id() {
        let service = test_service().await;

        let (first_user, first_account) = service
            .resolve(&mp_identity("U1", "O1", Some("Alice")), LoginSurface::OfficialAccount)
            .await
            .unwrap();
        let (second_user, second_account) = service
            .resolve(&mp_identity("U1", "O1", Some("Alice")), LoginSurface::OfficialAccount)
            .await
            .unwrap();

        assert_eq!(first_user.id, second_user.id);
        assert_eq!(first_account.id, second_account.id);

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&service.db)
            .await
            .unwrap();
        let accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_accounts")
            .fetch_one(&service.db)
            .await
            .unwrap();
        assert_eq!(users, 1);
        assert_eq!(accounts, 1);
    }

    #[tokio::test]
    async fn test_repeat_login_updates_nickname_in_place() {
        let service = test_service().await;

        service
            .resolve(&mp_identity("U1", "O1", Some("Alice")), LoginSurface::OfficialAccount)
            .await
            .unwrap();
        let (_, account) = service
            .resolve(&mp_identity("U1", "O1", Some("Alicia")), LoginSurface::OfficialAccount)
            .await
            .unwrap();

        assert_eq!(account.nickname.as_deref(), Some("Alicia"));

        let accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_accounts")
            .fetch_one(&service.db)
            .await
            .unwrap();
        assert_eq!(accounts, 1);
    }

    #[tokio::test]
    async fn test_blank_fetch_does_not_erase_stored_values() {
        let service = test_service().await;

        service
            .resolve(&mp_identity("U1", "O1", Some("Alice")), LoginSurface::OfficialAccount)
            .await
            .unwrap();

        let mut blank = mp_identity("U1", "O1", None);
        blank.avatar_url = None;
        let (_, account) = service
            .resolve(&blank, LoginSurface::OfficialAccount)
            .await
            .unwrap();

        assert_eq!(account.nickname.as_deref(), Some("Alice"));
        assert_eq!(
            account.avatar_url.as_deref(),
            Some("http://wx.example/avatar.png")
        );
    }

    #[tokio::test]
    async fn test_two_surfaces_share_one_user() {
        let service = test_service().await;

        let (mp_user, mp_account) = service
            .resolve(&mp_identity("U1", "MP_OPEN_ID", Some("Alice")), LoginSurface::OfficialAccount)
            .await
            .unwrap();

        let qr = ProviderIdentity {
            open_id: "WEB_OPEN_ID".to_string(),
            exchange_union_id: Some("U1".to_string()),
            profile_union_id: None,
            nickname: Some("Alice".to_string()),
            avatar_url: None,
        };
        let (web_user, web_account) = service
            .resolve(&qr, LoginSurface::OpenPlatform)
            .await
            .unwrap();

        assert_eq!(mp_user.id, web_user.id);
        assert_ne!(mp_account.id, web_account.id);
        assert_eq!(mp_account.app_id, "wx_mp_app");
        assert_eq!(web_account.app_id, "wx_open_app");
        assert_eq!(web_account.kind, "web");
    }

    #[tokio::test]
    async fn test_lost_insert_race_is_recovered() {
        let service = test_service().await;

        // Simulate the concurrent winner by inserting the row the
        // losing request will conflict with.
        let now = Utc::now();
        sqlx::query("INSERT INTO users (id, union_id, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind("U_EXISTING")
            .bind("U_RACE")
            .bind(now)
            .bind(now)
            .execute(&service.db)
            .await
            .unwrap();

        // The conflicting insert is what a racing request would issue
        // after its lookup missed; it must classify as a unique
        // violation so the resolver re-reads instead of failing.
        let conflict = sqlx::query(
            "INSERT INTO users (id, union_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind("U_LOSER")
        .bind("U_RACE")
        .bind(now)
        .bind(now)
        .execute(&service.db)
        .await
        .unwrap_err();
        assert!(is_unique_violation(&conflict));

        let user = service.find_or_create_user("U_RACE").await.unwrap();
        assert_eq!(user.id, "U_EXISTING");

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&service.db)
            .await
            .unwrap();
        assert_eq!(users, 1);
    }
}
