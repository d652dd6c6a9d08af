//! Configuration for the dashboard authorization server.

use std::time::Duration;

use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::ConfigError;

/// Default lifetimes and limits.
pub mod defaults {
    use std::time::Duration;

    /// Host used when a request carries no host headers.
    pub const FALLBACK_HOST: &str = "dashboard.localhost";

    /// Authorization code lifetime (10 minutes).
    pub const AUTH_CODE_LIFETIME: Duration = Duration::from_secs(600);

    /// Access token lifetime (1 hour).
    pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

    /// Refresh token lifetime (30 days).
    pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 24 * 3600);

    /// Authorization parameter cookie lifetime (10 minutes).
    pub const PARAMS_COOKIE_LIFETIME: Duration = Duration::from_secs(600);

    /// Interval between expired-credential sweeps.
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Dynamic client registrations accepted per minute.
    pub const REGISTRATIONS_PER_MINUTE: u32 = 60;

    /// Length of a generated cookie signing key.
    pub const COOKIE_SECRET_LEN: usize = 32;
}

/// A client provisioned by the operator rather than through registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedClient {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    /// Space-delimited scope; `None` grants every supported scope.
    pub scope: Option<String>,
}

/// Server configuration.
#[derive(Clone)]
pub struct Config {
    /// Host used for base URL resolution when no host header is present.
    pub fallback_host: String,

    /// Operator password checked by the interactive login step.
    pub login_password: Option<String>,

    /// HMAC key for the authorization parameter cookie.
    pub cookie_secret: Vec<u8>,

    /// Authorization code lifetime.
    pub auth_code_lifetime: Duration,

    /// Access token lifetime.
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    pub refresh_token_lifetime: Duration,

    /// Authorization parameter cookie lifetime.
    pub params_cookie_lifetime: Duration,

    /// Expired-credential sweep interval.
    pub cleanup_interval: Duration,

    /// Registration rate limit; 0 disables it.
    pub registrations_per_minute: u32,

    /// Trusted clients inserted at startup.
    pub seed_clients: Vec<SeedClient>,
}

impl Config {
    /// Create a configuration with default lifetimes.
    ///
    /// A random cookie secret is generated when none is supplied, so pending
    /// authorization requests do not survive a restart.
    #[must_use]
    pub fn new(login_password: Option<String>, cookie_secret: Option<String>) -> Self {
        let cookie_secret = cookie_secret
            .filter(|s| !s.is_empty())
            .map(String::into_bytes)
            .unwrap_or_else(random_secret);

        Self {
            fallback_host: defaults::FALLBACK_HOST.to_string(),
            login_password: login_password.filter(|p| !p.is_empty()),
            cookie_secret,
            auth_code_lifetime: defaults::AUTH_CODE_LIFETIME,
            access_token_lifetime: defaults::ACCESS_TOKEN_LIFETIME,
            refresh_token_lifetime: defaults::REFRESH_TOKEN_LIFETIME,
            params_cookie_lifetime: defaults::PARAMS_COOKIE_LIFETIME,
            cleanup_interval: defaults::CLEANUP_INTERVAL,
            registrations_per_minute: defaults::REGISTRATIONS_PER_MINUTE,
            seed_clients: Vec::new(),
        }
    }

    /// Create a test configuration with a fixed password and secret and no
    /// registration limit.
    #[must_use]
    pub fn for_testing(login_password: &str) -> Self {
        Self {
            registrations_per_minute: 0,
            ..Self::new(
                Some(login_password.to_string()),
                Some("test-cookie-secret-0123456789abcdef".to_string()),
            )
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if `OAUTH_SEED_CLIENTS` or a numeric variable is malformed.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new(
            std::env::var("DASHBOARD_LOGIN_PASSWORD").ok(),
            std::env::var("OAUTH_COOKIE_SECRET").ok(),
        );

        if let Ok(host) = std::env::var("FALLBACK_HOST") {
            config.fallback_host = host;
        }
        if let Ok(limit) = std::env::var("OAUTH_REGISTRATIONS_PER_MINUTE") {
            config.registrations_per_minute = limit.parse()?;
        }
        if let Ok(seeds) = std::env::var("OAUTH_SEED_CLIENTS") {
            config.seed_clients = parse_seed_clients(&seeds)?;
        }

        Ok(config)
    }

    /// Check if the interactive login step can succeed.
    #[must_use]
    pub const fn has_login_password(&self) -> bool {
        self.login_password.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("fallback_host", &self.fallback_host)
            .field("has_login_password", &self.has_login_password())
            .field("auth_code_lifetime", &self.auth_code_lifetime)
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .field("registrations_per_minute", &self.registrations_per_minute)
            .field("seed_clients", &self.seed_clients.len())
            .finish()
    }
}

/// Parse `;`-separated seed client entries of the form
/// `client_id|client_name|uri1,uri2[|scope scope]`.
///
/// # Errors
///
/// Returns error when an entry lacks an id, name, or redirect URI.
pub fn parse_seed_clients(raw: &str) -> Result<Vec<SeedClient>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_seed_client)
        .collect()
}

fn parse_seed_client(entry: &str) -> Result<SeedClient, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidSeedClient {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
    if !(3..=4).contains(&parts.len()) {
        return Err(invalid("expected client_id|client_name|redirect_uris[|scope]"));
    }

    let client_id = parts[0];
    let client_name = parts[1];
    if client_id.is_empty() {
        return Err(invalid("client_id is empty"));
    }
    if client_name.is_empty() {
        return Err(invalid("client_name is empty"));
    }

    let redirect_uris: Vec<String> = parts[2]
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();
    if redirect_uris.is_empty() {
        return Err(invalid("at least one redirect URI is required"));
    }

    let scope = parts.get(3).filter(|s| !s.is_empty()).map(|s| (*s).to_string());

    Ok(SeedClient {
        client_id: client_id.to_string(),
        client_name: client_name.to_string(),
        redirect_uris,
        scope,
    })
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; defaults::COOKIE_SECRET_LEN];
    OsRng.fill_bytes(&mut secret);
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(!config.has_login_password());
        assert_eq!(config.cookie_secret.len(), defaults::COOKIE_SECRET_LEN);
        assert_eq!(config.fallback_host, defaults::FALLBACK_HOST);
    }

    #[test]
    fn test_empty_password_is_unset() {
        let config = Config::new(Some(String::new()), None);
        assert!(!config.has_login_password());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = Config::for_testing("hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("test-cookie-secret"));
    }

    #[test]
    fn test_parse_seed_clients() {
        let seeds = parse_seed_clients(
            "desktop|Desktop App|http://localhost:3000/cb,http://127.0.0.1:3000/cb; \
             cli|CLI|urn:ietf:wg:oauth:2.0:oob|wiki:read admin:read",
        )
        .unwrap();

        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].redirect_uris.len(), 2);
        assert_eq!(seeds[0].scope, None);
        assert_eq!(seeds[1].scope.as_deref(), Some("wiki:read admin:read"));
    }

    #[test]
    fn test_parse_seed_clients_rejects_missing_uris() {
        assert!(parse_seed_clients("id|name|").is_err());
        assert!(parse_seed_clients("id|name").is_err());
        assert!(parse_seed_clients("|name|http://x/cb").is_err());
    }
}
