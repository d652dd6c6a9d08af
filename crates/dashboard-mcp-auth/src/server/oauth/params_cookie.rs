//! Authorization request state carried across the login redirect.
//!
//! The validated request travels in two cookies instead of a server-side
//! session:
//! - `mcp_oauth_params`: JSON of the six request fields (percent-encoded
//!   on the wire), readable by the login page script.
//! - `mcp_oauth_params_sig`: `<issued_at>.<HMAC-SHA256>` over the issue time
//!   and the JSON, `HttpOnly`.
//!
//! Both expire after the configured lifetime; an abandoned flow simply lapses.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{OAuthError, OAuthResult};

type HmacSha256 = Hmac<Sha256>;

/// Cookie holding the request JSON.
pub const PARAMS_COOKIE: &str = "mcp_oauth_params";

/// Cookie holding the signature over [`PARAMS_COOKIE`].
pub const SIGNATURE_COOKIE: &str = "mcp_oauth_params_sig";

/// A validated authorization request awaiting the login step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizationParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    #[serde(default)]
    pub scope: String,
    pub state: Option<String>,
}

/// Issues and opens the signed parameter cookies.
#[derive(Clone)]
pub struct ParamsCookie {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl ParamsCookie {
    #[must_use]
    pub fn new(secret: Vec<u8>, lifetime: Duration) -> Self {
        Self { secret, lifetime }
    }

    fn mac(&self, issued_at: i64, json: &str) -> OAuthResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| OAuthError::server_error("Cookie signing key is unusable"))?;
        mac.update(issued_at.to_string().as_bytes());
        mac.update(b".");
        mac.update(json.as_bytes());
        Ok(mac)
    }

    fn build(&self, name: &'static str, value: String, http_only: bool) -> Cookie<'static> {
        let max_age = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((name, value))
            .path("/")
            .secure(true)
            .http_only(http_only)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age))
            .build()
    }

    /// Add the parameter and signature cookies to `jar`.
    pub fn issue(
        &self,
        jar: CookieJar,
        params: &AuthorizationParams,
        now: DateTime<Utc>,
    ) -> OAuthResult<CookieJar> {
        let json = serde_json::to_string(params)
            .map_err(|_| OAuthError::server_error("Could not encode authorization request"))?;

        let issued_at = now.timestamp();
        let signature = URL_SAFE_NO_PAD.encode(self.mac(issued_at, &json)?.finalize().into_bytes());

        let params_cookie = self.build(PARAMS_COOKIE, json, false);
        let sig_cookie = self.build(SIGNATURE_COOKIE, format!("{issued_at}.{signature}"), true);

        Ok(jar.add(params_cookie).add(sig_cookie))
    }

    /// Recover the request from `jar`, rejecting missing, forged, or stale cookies.
    pub fn open(&self, jar: &CookieJar, now: DateTime<Utc>) -> OAuthResult<AuthorizationParams> {
        let missing = || OAuthError::invalid_request("No pending authorization request");
        let tampered = || OAuthError::invalid_request("Authorization request could not be verified");

        let params = jar.get(PARAMS_COOKIE).ok_or_else(missing)?;
        let signed = jar.get(SIGNATURE_COOKIE).ok_or_else(missing)?;
        let json = params.value();

        let (issued_at, signature) = signed.value().split_once('.').ok_or_else(tampered)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| tampered())?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| tampered())?;

        self.mac(issued_at, json)?
            .verify_slice(&signature)
            .map_err(|_| tampered())?;

        let max_age = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let age = now.timestamp() - issued_at;
        if !(0..=max_age).contains(&age) {
            return Err(OAuthError::invalid_request("Authorization request has expired"));
        }

        serde_json::from_str(json).map_err(|_| tampered())
    }

    /// Drop both cookies once the login step has consumed them.
    #[must_use]
    pub fn clear(jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build(PARAMS_COOKIE).path("/"))
            .remove(Cookie::build(SIGNATURE_COOKIE).path("/"))
    }
}

impl std::fmt::Debug for ParamsCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamsCookie").field("lifetime", &self.lifetime).finish()
    }
}
