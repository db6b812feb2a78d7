// src/services/wechat.rs
//! WeChat OAuth client.
//!
//! Performs the two outbound calls of the login dance: authorization
//! code exchange and profile fetch. The two OAuth surfaces (open
//! platform QR login, official-account in-app login) share the token
//! endpoint but differ in credentials, profile endpoint, and in which
//! response carries the union id. This client only reports what WeChat
//! returned; picking the right union id location is the identity
//! resolver's job.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::common::config::Config;
use crate::common::error::AuthError;

const ACCESS_TOKEN_URL: &str = "https://api.weixin.qq.com/sns/oauth2/access_token";
const USERINFO_URL_MP: &str = "https://api.weixin.qq.com/sns/userinfo";
const USERINFO_URL_OPEN: &str = "https://api.open.weixin.qq.com/sns/userinfo";

/// Which OAuth entry point the login came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginSurface {
    /// PC QR-code login via the open platform.
    #[serde(rename = "open")]
    OpenPlatform,
    /// In-app login via the official account.
    #[serde(rename = "mp")]
    OfficialAccount,
}

impl LoginSurface {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginSurface::OpenPlatform => "open",
            LoginSurface::OfficialAccount => "mp",
        }
    }

    /// Account kind recorded on the linked provider account.
    pub fn account_kind(self) -> AccountKind {
        match self {
            LoginSurface::OpenPlatform => AccountKind::Web,
            LoginSurface::OfficialAccount => AccountKind::Mp,
        }
    }
}

/// How a provider account was created, one kind per OAuth surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Web,
    Mp,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Web => "web",
            AccountKind::Mp => "mp",
        }
    }
}

/// Response of the code → access-token exchange.
///
/// WeChat mixes payload and error reporting in one object: on failure
/// only `errcode`/`errmsg` are populated. `unionid` is present here for
/// the open-platform surface only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeChatTokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub openid: String,
    pub scope: Option<String>,
    pub unionid: Option<String>,
    pub errcode: Option<i64>,
    pub errmsg: Option<String>,
}

/// Response of the profile fetch. `unionid` is present here for the
/// official-account surface (scope `snsapi_userinfo`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeChatProfile {
    pub openid: String,
    pub nickname: Option<String>,
    pub headimgurl: Option<String>,
    pub unionid: Option<String>,
    pub errcode: Option<i64>,
    pub errmsg: Option<String>,
}

pub struct WeChatService {
    http: Client,
    config: Arc<Config>,
}

impl WeChatService {
    pub fn new(http: Client, config: Arc<Config>) -> Self {
        Self { http, config }
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(
        &self,
        code: &str,
        surface: LoginSurface,
    ) -> Result<WeChatTokenResponse, AuthError> {
        let (app_id, app_secret) = self.config.wechat_credentials(surface);

        debug!(surface = surface.as_str(), app_id, "Exchanging WeChat authorization code");

        let response = self
            .http
            .get(ACCESS_TOKEN_URL)
            .query(&[
                ("appid", app_id),
                ("secret", app_secret),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        let token: WeChatTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("bad token response: {}", e)))?;

        check_errcode(token.errcode, token.errmsg.as_deref())?;

        Ok(token)
    }

    /// Fetch the user profile behind an access token.
    pub async fn fetch_profile(
        &self,
        access_token: &str,
        open_id: &str,
        surface: LoginSurface,
    ) -> Result<WeChatProfile, AuthError> {
        let url = match surface {
            LoginSurface::OfficialAccount => USERINFO_URL_MP,
            LoginSurface::OpenPlatform => USERINFO_URL_OPEN,
        };

        let mut params = vec![("access_token", access_token), ("openid", open_id)];
        if surface == LoginSurface::OfficialAccount {
            params.push(("lang", "zh_CN"));
        }

        debug!(surface = surface.as_str(), open_id, "Fetching WeChat user profile");

        let response = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        let profile: WeChatProfile = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("bad profile response: {}", e)))?;

        check_errcode(profile.errcode, profile.errmsg.as_deref())?;

        Ok(profile)
    }
}

/// WeChat reports failures through an in-band errcode; any non-zero
/// value means the request was rejected.
fn check_errcode(errcode: Option<i64>, errmsg: Option<&str>) -> Result<(), AuthError> {
    match errcode {
        Some(code) if code != 0 => {
            let message = errmsg.unwrap_or("unknown error").to_string();
            warn!(code, %message, "WeChat API rejected the request");
            Err(AuthError::ProviderRejected { code, message })
        }
        _ => Ok(()),
    }
}
