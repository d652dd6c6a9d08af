//! Authorization code and token lifecycle.
//!
//! Codes are single-use: a second presentation of the same code fails and
//! revokes every token descended from the first exchange. Refresh tokens
//! rotate on every use.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use rand::rngs::OsRng;

use super::pkce;
use super::scope;
use super::store::{CredentialStore, Redemption};
use super::types::{AccessToken, AuthCode, RefreshToken, TokenPair};
use crate::config::Config;
use crate::error::{OAuthError, OAuthResult};

/// Bytes of entropy in codes and tokens.
const TOKEN_BYTES: usize = 32;

/// Generate an opaque credential (256 bits, base64url).
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn delta(lifetime: Duration) -> TimeDelta {
    TimeDelta::from_std(lifetime).unwrap_or(TimeDelta::MAX)
}

/// Parameters of an authorization code exchange.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub code_verifier: &'a str,
}

/// Result of validating a bearer token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Issues, exchanges, refreshes and revokes credentials.
#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn CredentialStore>,
    auth_code_lifetime: Duration,
    access_token_lifetime: Duration,
    refresh_token_lifetime: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, config: &Config) -> Self {
        Self {
            store,
            auth_code_lifetime: config.auth_code_lifetime,
            access_token_lifetime: config.access_token_lifetime,
            refresh_token_lifetime: config.refresh_token_lifetime,
        }
    }

    /// Create an authorization code for an approved request.
    pub async fn issue_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        code_challenge: &str,
        scopes: Vec<String>,
        now: DateTime<Utc>,
    ) -> OAuthResult<String> {
        let code = generate_token();
        self.store
            .insert_auth_code(
                code.clone(),
                AuthCode {
                    client_id: client_id.to_owned(),
                    redirect_uri: redirect_uri.to_owned(),
                    code_challenge: code_challenge.to_owned(),
                    scopes,
                    expires_at: now + delta(self.auth_code_lifetime),
                },
            )
            .await?;
        Ok(code)
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange_code(
        &self,
        req: CodeExchange<'_>,
        now: DateTime<Utc>,
    ) -> OAuthResult<TokenPair> {
        let auth_code = match self.store.redeem_auth_code(req.code, now).await? {
            Redemption::Fresh(auth_code) => auth_code,
            Redemption::Replayed(marker) => {
                return Err(self.revoke_replayed(req.code, &marker.client_id).await);
            }
            Redemption::Unknown => {
                return Err(OAuthError::invalid_grant("Invalid or expired authorization code"));
            }
        };

        if auth_code.client_id != req.client_id {
            return Err(OAuthError::invalid_grant("client_id does not match the authorization code"));
        }
        if auth_code.redirect_uri != req.redirect_uri {
            return Err(OAuthError::invalid_grant("redirect_uri mismatch"));
        }
        if !pkce::is_valid_verifier(req.code_verifier)
            || !pkce::verify_s256(req.code_verifier, &auth_code.code_challenge)
        {
            return Err(OAuthError::invalid_grant("PKCE verification failed"));
        }

        let pair = self
            .create_token_pair(&auth_code.client_id, auth_code.scopes, req.code, now)
            .await?;

        // A replay that landed while the pair was being stored revoked the
        // family before these tokens existed.
        if self.store.is_replayed(req.code).await? {
            return Err(self.revoke_replayed(req.code, &auth_code.client_id).await);
        }

        tracing::info!(client_id = %auth_code.client_id, "Issued token pair");
        Ok(pair)
    }

    async fn revoke_replayed(&self, code: &str, client_id: &str) -> OAuthError {
        match self.store.revoke_family(code).await {
            Ok(revoked) => {
                tracing::warn!(
                    client_id = %client_id,
                    revoked,
                    "Authorization code replayed; revoked descendant tokens"
                );
                OAuthError::invalid_grant("Authorization code has already been used")
            }
            Err(e) => e.into(),
        }
    }

    /// Rotate a refresh token: the old pair is invalidated and a new one issued.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: Option<&str>,
        requested_scope: Option<&str>,
        now: DateTime<Utc>,
    ) -> OAuthResult<TokenPair> {
        let Some(old) = self.store.take_refresh_token(refresh_token).await? else {
            return Err(OAuthError::invalid_grant("Invalid or expired refresh token"));
        };
        self.store.delete_access_token(&old.access_token).await?;

        if old.is_expired(now) {
            return Err(OAuthError::invalid_grant("Invalid or expired refresh token"));
        }
        if client_id.is_some_and(|id| id != old.client_id) {
            return Err(OAuthError::invalid_grant("client_id does not match the refresh token"));
        }

        let scopes = match requested_scope.map(scope::parse) {
            Some(requested) if !requested.is_empty() => {
                if !scope::is_subset(&requested, &old.scopes) {
                    return Err(OAuthError::invalid_scope(
                        "Requested scope exceeds the original grant",
                    ));
                }
                requested
            }
            _ => old.scopes,
        };

        let pair = self
            .create_token_pair(&old.client_id, scopes, &old.origin_code, now)
            .await?;

        tracing::info!(client_id = %old.client_id, "Refreshed token pair");
        Ok(pair)
    }

    /// Revoke an access or refresh token. Unknown tokens are a no-op.
    ///
    /// Returns whether anything was revoked.
    pub async fn revoke(&self, token: &str) -> OAuthResult<bool> {
        if let Some(refresh) = self.store.take_refresh_token(token).await? {
            self.store.delete_access_token(&refresh.access_token).await?;
            tracing::info!(client_id = %refresh.client_id, "Revoked refresh token");
            return Ok(true);
        }

        let revoked = self.store.delete_access_token(token).await?;
        if revoked {
            tracing::info!("Revoked access token");
        }
        Ok(revoked)
    }

    /// Validate a bearer token.
    pub async fn authenticate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> OAuthResult<Option<Authenticated>> {
        let Some(access) = self.store.find_access_token(token).await? else {
            return Ok(None);
        };
        if access.is_expired(now) {
            return Ok(None);
        }
        Ok(Some(Authenticated {
            client_id: access.client_id,
            scopes: access.scopes,
            expires_at: access.expires_at,
        }))
    }

    async fn create_token_pair(
        &self,
        client_id: &str,
        scopes: Vec<String>,
        origin_code: &str,
        now: DateTime<Utc>,
    ) -> OAuthResult<TokenPair> {
        let access = generate_token();
        let refresh = generate_token();
        let scope = scope::join(&scopes);

        self.store
            .insert_access_token(
                access.clone(),
                AccessToken {
                    client_id: client_id.to_owned(),
                    scopes: scopes.clone(),
                    expires_at: now + delta(self.access_token_lifetime),
                    origin_code: origin_code.to_owned(),
                },
            )
            .await?;

        self.store
            .insert_refresh_token(
                refresh.clone(),
                RefreshToken {
                    client_id: client_id.to_owned(),
                    access_token: access.clone(),
                    scopes,
                    expires_at: now + delta(self.refresh_token_lifetime),
                    origin_code: origin_code.to_owned(),
                },
            )
            .await?;

        Ok(TokenPair {
            access_token: access,
            refresh_token: refresh,
            expires_in: self.access_token_lifetime.as_secs(),
            scope,
        })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_token_lifetime", &self.access_token_lifetime)
            .finish()
    }
}
