//! Credential store: clients, authorization codes, and tokens.
//!
//! [`CredentialStore`] is the seam to the backing datastore. Handlers only
//! see table-style operations (insert, find, take, delete by key), so a
//! relational implementation can replace [`MemoryStore`] without touching
//! endpoint logic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use moka::future::Cache;
use tokio::sync::RwLock;

use super::types::{AccessToken, AuthCode, OAuthClient, RedeemedCode, RefreshToken};
use crate::error::{StoreError, StoreResult};

/// Upper bound on outstanding authorization codes.
const MAX_PENDING_CODES: u64 = 10_000;

/// Outcome of redeeming an authorization code.
#[derive(Debug, Clone)]
pub enum Redemption {
    /// First redemption; the code is now spent.
    Fresh(AuthCode),
    /// The code was already redeemed once.
    Replayed(RedeemedCode),
    /// Never issued, or expired.
    Unknown,
}

/// Row counts, for readiness reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub clients: usize,
    pub access_tokens: usize,
    pub refresh_tokens: usize,
}

/// Table-style operations on OAuth credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a client; fails with `Conflict` if the id is taken.
    async fn insert_client(&self, client: OAuthClient) -> StoreResult<()>;

    async fn find_client(&self, client_id: &str) -> StoreResult<Option<OAuthClient>>;

    async fn insert_auth_code(&self, code: String, auth_code: AuthCode) -> StoreResult<()>;

    /// Atomically spend an authorization code.
    ///
    /// A code yields [`Redemption::Fresh`] at most once. Later calls see
    /// [`Redemption::Replayed`] and flag the code as replayed, for as long as
    /// tokens issued from it can live.
    async fn redeem_auth_code(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Redemption>;

    /// Whether a redeemed code has since been presented again.
    async fn is_replayed(&self, code: &str) -> StoreResult<bool>;

    async fn insert_access_token(&self, token: String, record: AccessToken) -> StoreResult<()>;

    async fn find_access_token(&self, token: &str) -> StoreResult<Option<AccessToken>>;

    /// Returns whether a row was removed.
    async fn delete_access_token(&self, token: &str) -> StoreResult<bool>;

    async fn insert_refresh_token(&self, token: String, record: RefreshToken) -> StoreResult<()>;

    /// Remove and return a refresh token.
    async fn take_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>>;

    /// Delete every token descending from an authorization code.
    async fn revoke_family(&self, origin_code: &str) -> StoreResult<usize>;

    /// Delete expired rows, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize>;

    async fn stats(&self) -> StoreResult<StoreStats>;
}

/// In-memory credential store.
#[derive(Clone)]
pub struct MemoryStore {
    clients: Arc<RwLock<HashMap<String, OAuthClient>>>,
    auth_codes: Cache<String, AuthCode>,
    redeemed_codes: Arc<RwLock<HashMap<String, RedeemedCode>>>,
    replay_retention: TimeDelta,
    access_tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
}

impl MemoryStore {
    /// Create a store whose authorization codes live at most `code_lifetime`
    /// and whose redeemed-code markers are kept for `replay_retention`.
    ///
    /// Retention should cover the longest token lifetime, so a late replay
    /// can still revoke what the code produced.
    #[must_use]
    pub fn new(code_lifetime: Duration, replay_retention: Duration) -> Self {
        let auth_codes = Cache::builder()
            .max_capacity(MAX_PENDING_CODES)
            .time_to_live(code_lifetime)
            .build();

        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            auth_codes,
            redeemed_codes: Arc::new(RwLock::new(HashMap::new())),
            replay_retention: TimeDelta::from_std(replay_retention).unwrap_or(TimeDelta::MAX),
            access_tokens: Arc::new(RwLock::new(HashMap::new())),
            refresh_tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(
            crate::config::defaults::AUTH_CODE_LIFETIME,
            crate::config::defaults::REFRESH_TOKEN_LIFETIME,
        )
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_client(&self, client: OAuthClient) -> StoreResult<()> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.client_id) {
            return Err(StoreError::conflict("clients", client.client_id));
        }
        clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    async fn find_client(&self, client_id: &str) -> StoreResult<Option<OAuthClient>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn insert_auth_code(&self, code: String, auth_code: AuthCode) -> StoreResult<()> {
        if self.auth_codes.contains_key(&code) {
            return Err(StoreError::conflict("auth_codes", "<code>"));
        }
        self.auth_codes.insert(code, auth_code).await;
        Ok(())
    }

    async fn redeem_auth_code(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Redemption> {
        // Hold the marker table for the whole exchange so two concurrent
        // redemptions cannot both miss the marker.
        let mut redeemed = self.redeemed_codes.write().await;

        if let Some(marker) = redeemed.get_mut(code) {
            if now < marker.expires_at {
                marker.replayed = true;
                return Ok(Redemption::Replayed(marker.clone()));
            }
            redeemed.remove(code);
            return Ok(Redemption::Unknown);
        }

        let Some(auth_code) = self.auth_codes.remove(code).await else {
            return Ok(Redemption::Unknown);
        };
        if auth_code.is_expired(now) {
            return Ok(Redemption::Unknown);
        }

        redeemed.insert(
            code.to_owned(),
            RedeemedCode {
                client_id: auth_code.client_id.clone(),
                replayed: false,
                expires_at: now
                    .checked_add_signed(self.replay_retention)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );

        Ok(Redemption::Fresh(auth_code))
    }

    async fn is_replayed(&self, code: &str) -> StoreResult<bool> {
        Ok(self.redeemed_codes.read().await.get(code).is_some_and(|m| m.replayed))
    }

    async fn insert_access_token(&self, token: String, record: AccessToken) -> StoreResult<()> {
        self.access_tokens.write().await.insert(token, record);
        Ok(())
    }

    async fn find_access_token(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        Ok(self.access_tokens.read().await.get(token).cloned())
    }

    async fn delete_access_token(&self, token: &str) -> StoreResult<bool> {
        Ok(self.access_tokens.write().await.remove(token).is_some())
    }

    async fn insert_refresh_token(&self, token: String, record: RefreshToken) -> StoreResult<()> {
        self.refresh_tokens.write().await.insert(token, record);
        Ok(())
    }

    async fn take_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(self.refresh_tokens.write().await.remove(token))
    }

    async fn revoke_family(&self, origin_code: &str) -> StoreResult<usize> {
        let mut removed = 0;
        {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, t| t.origin_code != origin_code);
            removed += before - tokens.len();
        }
        {
            let mut tokens = self.refresh_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, t| t.origin_code != origin_code);
            removed += before - tokens.len();
        }
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.auth_codes.run_pending_tasks().await;

        let mut removed = 0;
        {
            let mut markers = self.redeemed_codes.write().await;
            let before = markers.len();
            markers.retain(|_, m| now < m.expires_at);
            removed += before - markers.len();
        }
        {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, t| !t.is_expired(now));
            let count = before - tokens.len();
            if count > 0 {
                tracing::debug!(count, "Cleaned up expired access tokens");
            }
            removed += count;
        }
        {
            let mut tokens = self.refresh_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, t| !t.is_expired(now));
            let count = before - tokens.len();
            if count > 0 {
                tracing::debug!(count, "Cleaned up expired refresh tokens");
            }
            removed += count;
        }
        Ok(removed)
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats {
            clients: self.clients.read().await.len(),
            access_tokens: self.access_tokens.read().await.len(),
            refresh_tokens: self.refresh_tokens.read().await.len(),
        })
    }
}

/// Start background cleanup of expired credentials.
pub fn start_cleanup_task(store: Arc<dyn CredentialStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "Purged expired credentials"),
                Err(e) => tracing::warn!(error = %e, "Credential cleanup failed"),
            }
        }
    });
}
