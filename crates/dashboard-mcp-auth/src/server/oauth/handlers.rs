//! OAuth 2.1 endpoint handlers.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256 only)
//! - RFC 6749: Authorization Code Grant and refresh
//! - RFC 7009: Token Revocation

use std::sync::Arc;

use axum::{
    Form, Json,
    body::Bytes,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;
use url::Url;

use super::base_url::resolve_base_url;
use super::issuer::CodeExchange;
use super::login::{self, LoginPage};
use super::params_cookie::{AuthorizationParams, ParamsCookie};
use super::pkce;
use super::scope::{self, SUPPORTED_SCOPES};
use super::types::{OAuthClient, TokenPair};
use crate::error::{OAuthError, OAuthResult};
use crate::server::transport::HttpState;

/// Path of the interactive login step.
pub const LOGIN_PATH: &str = "/mcp/authorize";

/// Path of the protected resource.
pub const RESOURCE_PATH: &str = "/mcp";

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

/// `GET /.well-known/oauth-protected-resource`
///
/// Tells clients where to find the authorization server for this resource.
pub async fn handle_protected_resource(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let base_url = resolve_base_url(&headers, &state.config.fallback_host);
    Json(serde_json::json!({
        "resource": format!("{base_url}{RESOURCE_PATH}"),
        "authorization_servers": [base_url],
        "scopes_supported": SUPPORTED_SCOPES,
        "bearer_methods_supported": ["header"],
        "resource_name": "Dashboard"
    }))
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
///
/// Describes the OAuth endpoints and capabilities.
pub async fn handle_auth_server_metadata(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let base_url = resolve_base_url(&headers, &state.config.fallback_host);
    Json(serde_json::json!({
        "issuer": base_url,
        "authorization_endpoint": format!("{base_url}/oauth/authorize"),
        "token_endpoint": format!("{base_url}/oauth/token"),
        "registration_endpoint": format!("{base_url}/oauth/register"),
        "revocation_endpoint": format!("{base_url}/oauth/revoke"),
        "scopes_supported": SUPPORTED_SCOPES,
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["none"],
        "revocation_endpoint_auth_methods_supported": ["none"],
        "code_challenge_methods_supported": [pkce::METHOD_S256]
    }))
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub scope: Option<String>,
}

/// Redirect URIs must be absolute and carry no fragment (RFC 6749 §3.1.2).
fn validate_redirect_uri(uri: &str) -> OAuthResult<()> {
    let parsed = Url::parse(uri)
        .map_err(|_| OAuthError::invalid_redirect_uri(format!("Invalid redirect URI: {uri}")))?;
    if parsed.fragment().is_some() {
        return Err(OAuthError::invalid_redirect_uri(
            "redirect_uris must not contain a fragment",
        ));
    }
    Ok(())
}

/// `POST /oauth/register`
///
/// Register a new public OAuth client dynamically.
pub async fn handle_register(
    State(state): State<Arc<HttpState>>,
    body: Bytes,
) -> OAuthResult<Response> {
    if let Some(ref limiter) = state.registration_limiter {
        if limiter.check().is_err() {
            tracing::warn!("Registration rate limit exceeded");
            return Err(OAuthError::TemporarilyUnavailable(
                "Too many registrations, retry later".to_string(),
            ));
        }
    }

    let req: RegisterRequest = serde_json::from_slice(&body).map_err(|_| {
        OAuthError::invalid_client_metadata("Request body must be a JSON client metadata object")
    })?;

    let client_name = req
        .client_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| OAuthError::invalid_client_metadata("client_name is required"))?;

    let redirect_uris = req.redirect_uris.unwrap_or_default();
    if redirect_uris.is_empty() {
        return Err(OAuthError::invalid_client_metadata(
            "redirect_uris must be a non-empty array",
        ));
    }
    for uri in &redirect_uris {
        validate_redirect_uri(uri)?;
    }

    let client = state
        .registry
        .register(client_name, redirect_uris, req.scope.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "client_id": client.client_id,
            "client_name": client.client_name,
            "redirect_uris": client.redirect_uris,
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "scope": scope::join(&client.scopes),
            "token_endpoint_auth_method": "none"
        })),
    )
        .into_response())
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => OAuthError::server_error("Redirect target is not a valid header value")
            .into_response(),
    }
}

/// `GET /oauth/authorize`
///
/// Validate the request, park it in the signed parameter cookie, and hand
/// over to the interactive login step.
pub async fn handle_authorize(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    jar: CookieJar,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> OAuthResult<Response> {
    let Query(query) = query.map_err(|e| OAuthError::invalid_request(e.body_text()))?;

    if query.response_type.as_deref() != Some("code") {
        return Err(OAuthError::UnsupportedResponseType(
            "response_type must be 'code'".to_string(),
        ));
    }

    let (Some(client_id), Some(redirect_uri)) =
        (present(query.client_id), present(query.redirect_uri))
    else {
        return Err(OAuthError::invalid_request("client_id and redirect_uri are required"));
    };

    let Some(code_challenge) = present(query.code_challenge) else {
        return Err(OAuthError::invalid_request("code_challenge is required"));
    };
    if query.code_challenge_method.as_deref() != Some(pkce::METHOD_S256) {
        return Err(OAuthError::invalid_request("code_challenge_method must be 'S256'"));
    }

    state.registry.validate(&client_id, &redirect_uri).await?;

    let params = AuthorizationParams {
        client_id,
        redirect_uri,
        code_challenge,
        code_challenge_method: pkce::METHOD_S256.to_string(),
        scope: query.scope.unwrap_or_default(),
        state: query.state,
    };
    let jar = state.cookies.issue(jar, &params, Utc::now())?;

    tracing::info!(client_id = %params.client_id, "Authorization request accepted");

    let base_url = resolve_base_url(&headers, &state.config.fallback_host);
    Ok((jar, found(&format!("{base_url}{LOGIN_PATH}"))).into_response())
}

// ─── Interactive Login Step ──────────────────────────────────────────────────

fn error_page(status: StatusCode, message: &str) -> Response {
    (status, Html(login::render_error_page(message))).into_response()
}

/// Reopen the pending request and the client it names.
async fn pending_request(
    state: &HttpState,
    jar: &CookieJar,
) -> Result<(AuthorizationParams, OAuthClient), Response> {
    let params = state
        .cookies
        .open(jar, Utc::now())
        .map_err(|e| error_page(StatusCode::BAD_REQUEST, e.description()))?;

    let client = state
        .registry
        .validate(&params.client_id, &params.redirect_uri)
        .await
        .map_err(|e| error_page(e.status(), e.description()))?;

    Ok((params, client))
}

/// Build the client callback URL carrying `pairs` plus `state`.
fn callback_url(params: &AuthorizationParams, pairs: &[(&str, &str)]) -> Option<String> {
    let mut url = Url::parse(&params.redirect_uri).ok()?;
    {
        let mut query = url.query_pairs_mut();
        for (k, v) in pairs {
            query.append_pair(k, v);
        }
        if let Some(ref s) = params.state {
            query.append_pair("state", s);
        }
    }
    Some(url.into())
}

fn redirect_to_client(jar: CookieJar, params: &AuthorizationParams, pairs: &[(&str, &str)]) -> Response {
    match callback_url(params, pairs) {
        Some(location) => (ParamsCookie::clear(jar), found(&location)).into_response(),
        None => error_page(StatusCode::BAD_REQUEST, "The client's redirect URI is not a valid URL"),
    }
}

/// `GET /mcp/authorize`
///
/// Render the login page for the pending request.
pub async fn handle_login_page(State(state): State<Arc<HttpState>>, jar: CookieJar) -> Response {
    let (params, client) = match pending_request(&state, &jar).await {
        Ok(pending) => pending,
        Err(response) => return response,
    };

    let scopes = scope::grant(&scope::parse(&params.scope), &client.scopes);
    Html(login::render_login_page(&LoginPage {
        client_name: &client.client_name,
        client_id: &client.client_id,
        trusted: client.trusted,
        scopes: &scopes,
        error_message: None,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub password: Option<String>,
    pub action: Option<String>,
}

fn password_matches(expected: Option<&str>, given: Option<&str>) -> bool {
    match (expected, given) {
        (Some(expected), Some(given)) => bool::from(expected.as_bytes().ct_eq(given.as_bytes())),
        _ => false,
    }
}

/// `POST /mcp/authorize`
///
/// Check the operator password and, on approval, issue an authorization code
/// back to the client's redirect URI.
pub async fn handle_login_submit(
    State(state): State<Arc<HttpState>>,
    jar: CookieJar,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    let (params, client) = match pending_request(&state, &jar).await {
        Ok(pending) => pending,
        Err(response) => return response,
    };
    let Form(form) = match form {
        Ok(form) => form,
        Err(e) => return error_page(StatusCode::BAD_REQUEST, &e.body_text()),
    };

    if form.action.as_deref() == Some("deny") {
        tracing::info!(client_id = %client.client_id, "Authorization denied by user");
        return redirect_to_client(jar, &params, &[
            ("error", "access_denied"),
            ("error_description", "The user denied the request"),
        ]);
    }

    let requested = scope::parse(&params.scope);
    let scopes = scope::grant(&requested, &client.scopes);

    if !password_matches(state.config.login_password.as_deref(), form.password.as_deref()) {
        tracing::warn!(client_id = %client.client_id, "Login failed");
        let html = login::render_login_page(&LoginPage {
            client_name: &client.client_name,
            client_id: &client.client_id,
            trusted: client.trusted,
            scopes: &scopes,
            error_message: Some("Incorrect password"),
        });
        return (StatusCode::UNAUTHORIZED, Html(html)).into_response();
    }

    if !requested.is_empty() && scopes.is_empty() {
        return redirect_to_client(jar, &params, &[
            ("error", "invalid_scope"),
            ("error_description", "None of the requested scopes are available to this client"),
        ]);
    }

    let code = match state
        .issuer
        .issue_code(&client.client_id, &params.redirect_uri, &params.code_challenge, scopes, Utc::now())
        .await
    {
        Ok(code) => code,
        Err(e) => return error_page(e.status(), e.description()),
    };

    tracing::info!(client_id = %client.client_id, "Approved authorization");
    redirect_to_client(jar, &params, &[("code", code.as_str())])
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

/// A request body that names the field it cannot do without.
trait RequestBody: DeserializeOwned {
    fn has_required_field(&self) -> bool;
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Option<T> {
    serde_json::from_slice(body).ok()
}

fn decode_form<T: DeserializeOwned>(body: &[u8]) -> Option<T> {
    serde_urlencoded::from_bytes(body).ok()
}

/// Decode a form-encoded or JSON body, preferring the declared content type.
///
/// A decoding that parses but lacks the required field falls through to the
/// other encoding: a JSON object reads as a single empty-valued form key.
fn parse_body<T: RequestBody>(headers: &HeaderMap, body: &[u8]) -> Option<T> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let decoders: [fn(&[u8]) -> Option<T>; 2] = if is_json {
        [decode_json::<T>, decode_form::<T>]
    } else {
        [decode_form::<T>, decode_json::<T>]
    };

    let mut fallback = None;
    for decode in decoders {
        match decode(body) {
            Some(req) if req.has_required_field() => return Some(req),
            Some(req) if fallback.is_none() => fallback = Some(req),
            _ => {}
        }
    }
    fallback
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

impl RequestBody for TokenRequest {
    fn has_required_field(&self) -> bool {
        self.grant_type.is_some()
    }
}

/// Apply the cache headers RFC 6749 §5.1 requires on token responses.
fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// `POST /oauth/token`
///
/// Exchange an authorization code for tokens, or rotate a refresh token.
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = match parse_body::<TokenRequest>(&headers, &body) {
        Some(req) => match req.grant_type.as_deref() {
            Some("authorization_code") => authorization_code_grant(&state, &req).await,
            Some("refresh_token") => refresh_token_grant(&state, &req).await,
            Some(other) => Err(OAuthError::UnsupportedGrantType(format!(
                "Unsupported grant_type '{other}'"
            ))),
            None => Err(OAuthError::invalid_request("grant_type is required")),
        },
        None => Err(OAuthError::invalid_request("Malformed token request body")),
    };

    no_store(match result {
        Ok(pair) => token_success(&pair),
        Err(e) => e.into_response(),
    })
}

fn required<'a>(value: Option<&'a str>, name: &str) -> OAuthResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::invalid_request(format!("Missing {name}")))
}

async fn authorization_code_grant(state: &HttpState, req: &TokenRequest) -> OAuthResult<TokenPair> {
    let code = required(req.code.as_deref(), "code")?;
    let code_verifier = required(req.code_verifier.as_deref(), "code_verifier")?;
    let redirect_uri = required(req.redirect_uri.as_deref(), "redirect_uri")?;
    let client_id = required(req.client_id.as_deref(), "client_id")?;

    state
        .issuer
        .exchange_code(
            CodeExchange {
                code,
                client_id,
                redirect_uri,
                code_verifier,
            },
            Utc::now(),
        )
        .await
}

async fn refresh_token_grant(state: &HttpState, req: &TokenRequest) -> OAuthResult<TokenPair> {
    let Some(refresh_token) = req.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
        return Err(OAuthError::invalid_request("Missing refresh_token"));
    };

    state
        .issuer
        .refresh(refresh_token, req.client_id.as_deref(), req.scope.as_deref(), Utc::now())
        .await
}

fn token_success(pair: &TokenPair) -> Response {
    Json(serde_json::json!({
        "access_token": pair.access_token,
        "token_type": "Bearer",
        "expires_in": pair.expires_in,
        "refresh_token": pair.refresh_token,
        "scope": pair.scope
    }))
    .into_response()
}

// ─── RFC 7009: Token Revocation ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
}

impl RequestBody for RevokeRequest {
    fn has_required_field(&self) -> bool {
        self.token.is_some()
    }
}

/// `POST /oauth/revoke`
///
/// Answers 200 for any presented token, valid or not, so callers cannot
/// discover which tokens exist.
pub async fn handle_revoke(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> OAuthResult<Response> {
    let token = parse_body::<RevokeRequest>(&headers, &body)
        .and_then(|req| req.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("token is required"))?;

    if let Err(e) = state.issuer.revoke(&token).await {
        tracing::warn!(error = %e, "Revocation failed; reporting success");
    }

    Ok(Json(serde_json::json!({ "success": true })).into_response())
}
