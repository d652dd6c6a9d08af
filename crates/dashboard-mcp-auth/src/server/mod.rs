//! Authorization server runtime.
//!
//! Owns the credential store for the life of the process and serves the
//! OAuth endpoints over HTTP.

pub mod oauth;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use oauth::store::{self, CredentialStore, MemoryStore};
use transport::HttpState;

/// Dashboard authorization server.
pub struct AuthServer {
    state: Arc<HttpState>,
}

impl AuthServer {
    /// Create a server backed by an in-memory store, with seed clients loaded.
    ///
    /// # Errors
    ///
    /// Returns error if seeding the store fails.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new(
            config.auth_code_lifetime,
            config.refresh_token_lifetime,
        ));
        Self::with_store(config, store).await
    }

    /// Create a server around an existing store.
    ///
    /// # Errors
    ///
    /// Returns error if seeding the store fails.
    pub async fn with_store(config: Config, store: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        let state = Arc::new(HttpState::new(config, store));

        let seeded = state.seed_clients().await?;
        if seeded > 0 {
            tracing::info!(count = seeded, "Seeded trusted OAuth clients");
        }

        Ok(Self { state })
    }

    /// Run the server in HTTP mode.
    ///
    /// # Errors
    ///
    /// Returns error on server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        store::start_cleanup_task(Arc::clone(&self.state.store), self.state.config.cleanup_interval);

        let router = transport::create_router(self.state);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }

    /// Shared handler state.
    #[must_use]
    pub fn state(&self) -> Arc<HttpState> {
        Arc::clone(&self.state)
    }
}

impl std::fmt::Debug for AuthServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServer").field("config", &self.state.config).finish()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
