//! Client registry: registration, seeding, and authorization-time validation.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;

use super::scope;
use super::store::CredentialStore;
use super::types::OAuthClient;
use crate::config::SeedClient;
use crate::error::{OAuthError, OAuthResult, StoreError};

/// Bytes of entropy in a generated client identifier.
const CLIENT_ID_BYTES: usize = 16;

/// Generate a client identifier: 128 random bits as 32 lowercase hex chars.
#[must_use]
pub fn generate_client_id() -> String {
    let mut bytes = [0u8; CLIENT_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Client lookups and registration on top of a [`CredentialStore`].
#[derive(Clone)]
pub struct ClientRegistry {
    store: Arc<dyn CredentialStore>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Register a new untrusted public client (Dynamic Client Registration).
    pub async fn register(
        &self,
        client_name: String,
        redirect_uris: Vec<String>,
        requested_scope: Option<&str>,
    ) -> OAuthResult<OAuthClient> {
        let requested = requested_scope.map(scope::parse).unwrap_or_default();

        let client = OAuthClient {
            client_id: generate_client_id(),
            client_name,
            redirect_uris,
            scopes: scope::eligible(&requested, false),
            trusted: false,
            created_at: Utc::now(),
        };

        self.store.insert_client(client.clone()).await?;

        tracing::info!(client_id = %client.client_id, "Registered OAuth client");
        Ok(client)
    }

    /// Insert operator-provisioned trusted clients.
    ///
    /// A seed whose id already exists is skipped.
    pub async fn seed(&self, seeds: &[SeedClient]) -> OAuthResult<usize> {
        let mut inserted = 0;
        for seed in seeds {
            let requested = seed.scope.as_deref().map(scope::parse).unwrap_or_default();
            let client = OAuthClient {
                client_id: seed.client_id.clone(),
                client_name: seed.client_name.clone(),
                redirect_uris: seed.redirect_uris.clone(),
                scopes: scope::eligible(&requested, true),
                trusted: true,
                created_at: Utc::now(),
            };

            match self.store.insert_client(client).await {
                Ok(()) => inserted += 1,
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(client_id = %seed.client_id, "Seed client already present");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(inserted)
    }

    /// Check that `client_id` is known and `redirect_uri` is registered for it.
    pub async fn validate(&self, client_id: &str, redirect_uri: &str) -> OAuthResult<OAuthClient> {
        let Some(client) = self.store.find_client(client_id).await? else {
            return Err(OAuthError::invalid_client("Unknown client_id"));
        };

        if !client.accepts_redirect_uri(redirect_uri) {
            return Err(OAuthError::invalid_client(
                "redirect_uri is not registered for this client",
            ));
        }

        Ok(client)
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry").finish()
    }
}
