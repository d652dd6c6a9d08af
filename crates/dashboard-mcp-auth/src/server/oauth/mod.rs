//! OAuth 2.1 authorization server for MCP clients.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256)
//! - RFC 6749: Authorization Code Grant
//! - RFC 7009: Token Revocation

pub mod base_url;
pub mod handlers;
pub mod issuer;
pub mod login;
pub mod params_cookie;
pub mod pkce;
pub mod registry;
pub mod scope;
pub mod store;
pub mod types;

pub use issuer::TokenIssuer;
pub use registry::ClientRegistry;
pub use store::{CredentialStore, MemoryStore};
