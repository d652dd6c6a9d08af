//! HTTP transport: shared state, routing, and the bearer-protected resource.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::oauth::base_url::resolve_base_url;
use super::oauth::handlers::{self, LOGIN_PATH, RESOURCE_PATH};
use super::oauth::issuer::Authenticated;
use super::oauth::params_cookie::ParamsCookie;
use super::oauth::{ClientRegistry, CredentialStore, TokenIssuer};
use crate::config::Config;
use crate::error::OAuthResult;

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub config: Config,
    pub store: Arc<dyn CredentialStore>,
    pub registry: ClientRegistry,
    pub issuer: TokenIssuer,
    pub cookies: ParamsCookie,
    /// `None` when registration is unlimited.
    pub registration_limiter: Option<DefaultDirectRateLimiter>,
}

impl HttpState {
    /// Wire the endpoint collaborators around an explicitly constructed store.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn CredentialStore>) -> Self {
        let registry = ClientRegistry::new(Arc::clone(&store));
        let issuer = TokenIssuer::new(Arc::clone(&store), &config);
        let cookies = ParamsCookie::new(config.cookie_secret.clone(), config.params_cookie_lifetime);
        let registration_limiter = NonZeroU32::new(config.registrations_per_minute)
            .map(|per_minute| RateLimiter::direct(Quota::per_minute(per_minute)));

        Self {
            config,
            store,
            registry,
            issuer,
            cookies,
            registration_limiter,
        }
    }

    /// Insert the configured seed clients.
    pub async fn seed_clients(&self) -> OAuthResult<usize> {
        self.registry.seed(&self.config.seed_clients).await
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState").field("config", &self.config).finish()
    }
}

/// Create the HTTP router.
pub fn create_router(state: Arc<HttpState>) -> Router {
    let protected = Router::new()
        .route(RESOURCE_PATH, get(handle_resource).post(handle_resource))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer));

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Discovery
        .route("/.well-known/oauth-protected-resource", get(handlers::handle_protected_resource))
        .route(
            "/.well-known/oauth-authorization-server",
            get(handlers::handle_auth_server_metadata),
        )
        // Authorization flow
        .route("/oauth/authorize", get(handlers::handle_authorize))
        .route(LOGIN_PATH, get(handlers::handle_login_page).post(handlers::handle_login_submit))
        .route("/oauth/token", post(handlers::handle_token))
        .route("/oauth/register", post(handlers::handle_register))
        .route("/oauth/revoke", post(handlers::handle_revoke))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dashboard-mcp-auth",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<Arc<HttpState>>) -> Response {
    match state.store.stats().await {
        Ok(stats) => Json(serde_json::json!({
            "status": "ready",
            "service": "dashboard-mcp-auth",
            "version": env!("CARGO_PKG_VERSION"),
            "clients": stats.clients,
            "access_tokens": stats.access_tokens,
            "refresh_tokens": stats.refresh_tokens
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

/// 401 pointing the client at the protected resource metadata (RFC 9728 §5.1).
fn unauthorized(base_url: &str, token_presented: bool) -> Response {
    let mut challenge =
        format!(r#"Bearer resource_metadata="{base_url}/.well-known/oauth-protected-resource""#);
    if token_presented {
        challenge.push_str(r#", error="invalid_token""#);
    }

    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": if token_presented { "invalid_token" } else { "unauthorized" },
            "error_description": "A valid bearer token is required"
        })),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

/// Extract the credential from an `Authorization` value. The scheme is
/// case-insensitive (RFC 7235 §2.1).
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Reject requests without a live access token.
async fn require_bearer(
    State(state): State<Arc<HttpState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let base_url = resolve_base_url(req.headers(), &state.config.fallback_host);

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return unauthorized(&base_url, false);
    };

    match state.issuer.authenticate(&token, Utc::now()).await {
        Ok(Some(auth)) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Ok(None) => unauthorized(&base_url, true),
        Err(e) => e.into_response(),
    }
}

/// `GET|POST /mcp`
///
/// Describe the caller's grant.
async fn handle_resource(Extension(auth): Extension<Authenticated>) -> impl IntoResponse {
    Json(serde_json::json!({
        "client_id": auth.client_id,
        "scope": auth.scopes.join(" "),
        "expires_at": auth.expires_at.to_rfc3339()
    }))
}
