//! OAuth records held by the credential store.

use chrono::{DateTime, Utc};

/// A registered OAuth client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    /// Scopes this client may be granted.
    pub scopes: Vec<String>,
    /// Operator-provisioned clients are trusted; self-registered ones are not.
    pub trusted: bool,
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    /// Exact-match check against the registered redirect URIs.
    #[must_use]
    pub fn accepts_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }
}

/// An authorization code issued after the login step.
#[derive(Debug, Clone)]
pub struct AuthCode {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Marker kept for a code after its first redemption, for replay detection.
#[derive(Debug, Clone)]
pub struct RedeemedCode {
    pub client_id: String,
    /// Set once a second redemption has been attempted.
    pub replayed: bool,
    pub expires_at: DateTime<Utc>,
}

/// An access token for the protected resource.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    /// Authorization code this token descends from.
    pub origin_code: String,
}

/// A refresh token for obtaining new access tokens.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub client_id: String,
    /// Access token issued alongside this refresh token.
    pub access_token: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub origin_code: String,
}

impl AuthCode {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl AccessToken {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl RefreshToken {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A token pair returned from issuance or refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub scope: String,
}
