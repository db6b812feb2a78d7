// src/services/callback.rs
//! Callback URL validation.
//!
//! The OAuth `state` parameter round-trips a client-supplied return
//! URL; without this allow-list check it would be an open redirect.

use url::Url;

/// Validate a client-supplied callback URL against the configured
/// allow-list.
///
/// The literal root path is always allowed. Otherwise the URL must
/// parse, its hostname must match an allow-list entry (exact, or
/// `*.domain` covering the apex and any subdomain), and the scheme
/// must be https unless the host is localhost.
pub fn is_allowed_callback(callback_url: &str, allowed_domains: &[String]) -> bool {
    if callback_url == "/" {
        return true;
    }

    let Ok(parsed) = Url::parse(callback_url) else {
        return false;
    };
    let Some(hostname) = parsed.host_str() else {
        return false;
    };

    for allowed in allowed_domains {
        let matched = if let Some(base) = allowed.strip_prefix("*.") {
            hostname == base || hostname.ends_with(&format!(".{}", base))
        } else {
            hostname == allowed.as_str()
        };

        if matched {
            // Matched domains still need secure transport off loopback.
            return hostname == "localhost" || parsed.scheme() == "https";
        }
    }

    false
}
