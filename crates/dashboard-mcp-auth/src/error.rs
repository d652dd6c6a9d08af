//! Error types for the dashboard authorization server.
//!
//! Uses `thiserror` for structured error handling. [`OAuthError`] mirrors the
//! OAuth error-code vocabulary exactly and renders itself as the
//! `{error, error_description}` JSON body every endpoint returns on failure.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Errors surfaced to OAuth callers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// Missing or malformed request parameter.
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Unknown client, or redirect URI not registered for it.
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Registration body does not describe a usable client.
    #[error("invalid_client_metadata: {0}")]
    InvalidClientMetadata(String),

    /// A registered redirect URI is malformed (RFC 7591 §3.2.2).
    #[error("invalid_redirect_uri: {0}")]
    InvalidRedirectUri(String),

    /// Authorization code or refresh token is invalid, expired, or mismatched.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// Requested scope exceeds what was granted.
    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    /// `response_type` other than `code`.
    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    /// `grant_type` other than `authorization_code` or `refresh_token`.
    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    /// Request rejected by the rate limiter.
    #[error("temporarily_unavailable: {0}")]
    TemporarilyUnavailable(String),

    /// Backing store failed.
    #[error("server_error: {0}")]
    ServerError(String),
}

impl OAuthError {
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    #[must_use]
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::InvalidClient(description.into())
    }

    #[must_use]
    pub fn invalid_client_metadata(description: impl Into<String>) -> Self {
        Self::InvalidClientMetadata(description.into())
    }

    #[must_use]
    pub fn invalid_redirect_uri(description: impl Into<String>) -> Self {
        Self::InvalidRedirectUri(description.into())
    }

    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    #[must_use]
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::InvalidScope(description.into())
    }

    #[must_use]
    pub fn server_error(description: impl Into<String>) -> Self {
        Self::ServerError(description.into())
    }

    /// Machine-readable OAuth error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidClientMetadata(_) => "invalid_client_metadata",
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::TemporarilyUnavailable(_) => "temporarily_unavailable",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidRequest(d)
            | Self::InvalidClient(d)
            | Self::InvalidClientMetadata(d)
            | Self::InvalidRedirectUri(d)
            | Self::InvalidGrant(d)
            | Self::InvalidScope(d)
            | Self::UnsupportedResponseType(d)
            | Self::UnsupportedGrantType(d)
            | Self::TemporarilyUnavailable(d)
            | Self::ServerError(d) => d,
        }
    }

    /// HTTP status for the error response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::TemporarilyUnavailable(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({
                "error": self.code(),
                "error_description": self.description()
            })),
        )
            .into_response()
    }
}

/// Errors from the credential store.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row with the same key already exists.
    #[error("Duplicate key in {table}: {key}")]
    Conflict {
        /// Table the insert targeted
        table: &'static str,
        /// Conflicting key
        key: String,
    },
}

impl StoreError {
    #[must_use]
    pub fn conflict(table: &'static str, key: impl Into<String>) -> Self {
        Self::Conflict { table, key: key.into() }
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Credential store failure");
        Self::ServerError("The authorization server could not complete the request".to_string())
    }
}

/// Errors in startup configuration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A seed client entry could not be parsed.
    #[error("Invalid seed client entry '{entry}': {reason}")]
    InvalidSeedClient {
        /// The offending entry
        entry: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type alias for endpoint logic.
pub type OAuthResult<T> = Result<T, OAuthError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
