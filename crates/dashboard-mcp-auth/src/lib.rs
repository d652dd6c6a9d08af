//! Dashboard MCP Authorization Server
//!
//! An OAuth 2.1 authorization server that lets external Model Context
//! Protocol clients reach dashboard data on behalf of the operator.
//!
//! # Features
//!
//! - **Discovery**: protected-resource and authorization-server metadata
//! - **Dynamic registration**: public clients, no secrets, PKCE only
//! - **Authorization code + PKCE (S256)**: single-use codes with replay revocation
//! - **Refresh rotation and revocation**
//! - **Stateless login hand-off**: request state rides in a signed short-lived cookie
//!
//! # Example
//!
//! ```no_run
//! use dashboard_mcp_auth::{config::Config, server::AuthServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = AuthServer::new(config).await?;
//!     server.run_http(8000).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;

pub use config::Config;
pub use error::{OAuthError, StoreError};
pub use server::AuthServer;
