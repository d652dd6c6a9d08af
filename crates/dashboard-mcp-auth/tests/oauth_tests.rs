//! Endpoint tests for discovery, registration, authorization, and revocation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use serde_json::json;
use tower::ServiceExt;

use dashboard_mcp_auth::config::{Config, SeedClient};
use dashboard_mcp_auth::server::oauth::MemoryStore;
use dashboard_mcp_auth::server::transport::{HttpState, create_router};

const BASE_URL: &str = "https://example.com";
const PASSWORD: &str = "test-password";
const REDIRECT_URI: &str = "https://client.example.com/cb";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

fn build_test_router() -> axum::Router {
    let config = Config::for_testing(PASSWORD);
    let state = HttpState::new(config, Arc::new(MemoryStore::default()));
    create_router(Arc::new(state))
}

async fn build_seeded_router() -> axum::Router {
    let mut config = Config::for_testing(PASSWORD);
    config.seed_clients = vec![SeedClient {
        client_id: "dashboard-cli".to_string(),
        client_name: "Dashboard CLI".to_string(),
        redirect_uris: vec![REDIRECT_URI.to_string()],
        scope: None,
    }];
    let state = HttpState::new(config, Arc::new(MemoryStore::default()));
    state.seed_clients().await.unwrap();
    create_router(Arc::new(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("host", "example.com")
        .header("x-forwarded-proto", "https")
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, content_type: &str, body: String) -> Request<Body> {
    Request::post(uri)
        .header("host", "example.com")
        .header("x-forwarded-proto", "https")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn register(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(post(
            "/oauth/register",
            "application/json",
            json!({ "client_name": "Test Client", "redirect_uris": [REDIRECT_URI] }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["client_id"].as_str().unwrap().to_string()
}

fn authorize_uri(client_id: &str, extra: &str) -> String {
    format!(
        "/oauth/authorize?response_type=code&client_id={client_id}&redirect_uri={}&code_challenge={CHALLENGE}&code_challenge_method=S256{extra}",
        urlencoding::encode(REDIRECT_URI),
    )
}

/// Value of the named `Set-Cookie`, percent-decoded.
fn set_cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(n, _)| *n == name)
        .map(|(_, value)| urlencoding::decode(value).unwrap().into_owned())
}

// ─── Discovery ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_protected_resource_metadata() {
    let app = build_test_router();

    let response = app.oneshot(get("/.well-known/oauth-protected-resource")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["resource"], format!("{BASE_URL}/mcp"));
    assert_eq!(json["authorization_servers"], json!([BASE_URL]));
    assert_eq!(json["bearer_methods_supported"], json!(["header"]));
    assert_eq!(json["scopes_supported"].as_array().unwrap().len(), 12);
}

#[tokio::test]
async fn test_auth_server_metadata() {
    let app = build_test_router();

    let response = app.oneshot(get("/.well-known/oauth-authorization-server")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["issuer"], BASE_URL);
    assert_eq!(json["authorization_endpoint"], format!("{BASE_URL}/oauth/authorize"));
    assert_eq!(json["token_endpoint"], format!("{BASE_URL}/oauth/token"));
    assert_eq!(json["registration_endpoint"], format!("{BASE_URL}/oauth/register"));
    assert_eq!(json["revocation_endpoint"], format!("{BASE_URL}/oauth/revoke"));
    assert_eq!(json["code_challenge_methods_supported"], json!(["S256"]));
    assert_eq!(json["response_types_supported"], json!(["code"]));
    assert_eq!(json["token_endpoint_auth_methods_supported"], json!(["none"]));
}

#[tokio::test]
async fn test_metadata_uses_fallback_host() {
    let app = build_test_router();

    let response = app
        .oneshot(
            Request::get("/.well-known/oauth-authorization-server").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["issuer"], "https://dashboard.localhost");
}

#[tokio::test]
async fn test_metadata_loopback_defaults_to_http() {
    let app = build_test_router();

    let response = app
        .oneshot(
            Request::get("/.well-known/oauth-authorization-server")
                .header("host", "localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["issuer"], "http://localhost:3000");
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = build_test_router();

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");

    let response = app.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["clients"], 0);
}

// ─── Registration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_client() {
    let app = build_test_router();

    let response = app
        .oneshot(post(
            "/oauth/register",
            "application/json",
            json!({
                "client_name": "Test Client",
                "redirect_uris": [REDIRECT_URI, "http://localhost:8080/callback"]
            })
            .to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;

    let client_id = json["client_id"].as_str().unwrap();
    assert_eq!(client_id.len(), 32);
    assert!(client_id.chars().all(|c| c.is_ascii_hexdigit()));

    assert_eq!(json["client_name"], "Test Client");
    assert_eq!(json["redirect_uris"].as_array().unwrap().len(), 2);
    assert_eq!(json["token_endpoint_auth_method"], "none");
    assert_eq!(json["grant_types"], json!(["authorization_code", "refresh_token"]));

    // Self-registered clients never hold admin scopes
    let scope = json["scope"].as_str().unwrap();
    assert!(scope.contains("wiki:read"));
    assert!(!scope.contains("admin:"));
}

#[tokio::test]
async fn test_register_requested_scope_is_filtered() {
    let app = build_test_router();

    let response = app
        .oneshot(post(
            "/oauth/register",
            "application/json",
            json!({
                "client_name": "Narrow Client",
                "redirect_uris": [REDIRECT_URI],
                "scope": "wiki:read admin:write unknown:scope"
            })
            .to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["scope"], "wiki:read");
}

#[tokio::test]
async fn test_register_rejects_bad_metadata() {
    let app = build_test_router();

    let bodies = [
        json!({ "redirect_uris": [REDIRECT_URI] }),
        json!({ "client_name": "No URIs" }),
        json!({ "client_name": "Empty URIs", "redirect_uris": [] }),
    ];

    for body in bodies {
        let response = app
            .clone()
            .oneshot(post("/oauth/register", "application/json", body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json_body(response).await["error"], "invalid_client_metadata");
    }
}

#[tokio::test]
async fn test_register_rejects_malformed_redirect_uri() {
    let app = build_test_router();

    let bodies = [
        json!({ "client_name": "Bad URI", "redirect_uris": ["not a url"] }),
        json!({ "client_name": "Fragment", "redirect_uris": ["https://client.example.com/cb#x"] }),
    ];

    for body in bodies {
        let response = app
            .clone()
            .oneshot(post("/oauth/register", "application/json", body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json_body(response).await["error"], "invalid_redirect_uri");
    }
}

#[tokio::test]
async fn test_register_rate_limited() {
    let mut config = Config::for_testing(PASSWORD);
    config.registrations_per_minute = 1;
    let state = HttpState::new(config, Arc::new(MemoryStore::default()));
    let app = create_router(Arc::new(state));

    let body = json!({ "client_name": "Test Client", "redirect_uris": [REDIRECT_URI] }).to_string();

    let response = app
        .clone()
        .oneshot(post("/oauth/register", "application/json", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(post("/oauth/register", "application/json", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(response).await["error"], "temporarily_unavailable");
}

// ─── Authorization ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_authorize_redirects_to_login_with_params_cookie() {
    let app = build_test_router();
    let client_id = register(&app).await;

    let response = app
        .oneshot(get(&authorize_uri(&client_id, "&scope=wiki:read&state=xyz")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert_eq!(location, format!("{BASE_URL}/mcp/authorize"));

    let cookie = set_cookie_value(&response, "mcp_oauth_params").unwrap();
    let params: serde_json::Value = serde_json::from_str(&cookie).unwrap();
    let params = params.as_object().unwrap();
    assert_eq!(params.len(), 6);
    assert_eq!(params["client_id"], client_id.as_str());
    assert_eq!(params["redirect_uri"], REDIRECT_URI);
    assert_eq!(params["code_challenge"], CHALLENGE);
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["scope"], "wiki:read");
    assert_eq!(params["state"], "xyz");

    assert!(set_cookie_value(&response, "mcp_oauth_params_sig").is_some());

    let raw = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .find(|v| v.starts_with("mcp_oauth_params="))
        .unwrap();
    assert!(raw.contains("Path=/"));
    assert!(raw.contains("Secure"));
    assert!(raw.contains("SameSite=Lax"));
    assert!(raw.contains("Max-Age=600"));
    assert!(!raw.contains("HttpOnly"));
}

#[tokio::test]
async fn test_authorize_rejects_wrong_response_type() {
    let app = build_test_router();
    let client_id = register(&app).await;

    let uri = authorize_uri(&client_id, "").replace("response_type=code", "response_type=token");
    let response = app.oneshot(get(&uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "unsupported_response_type");
}

#[tokio::test]
async fn test_authorize_malformed_query_is_json() {
    let app = build_test_router();

    let response = app
        .oneshot(get("/oauth/authorize?response_type=code&response_type=code&client_id=c"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/json"), "content type: {content_type}");
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_requires_client_and_redirect() {
    let app = build_test_router();

    let response = app
        .oneshot(get("/oauth/authorize?response_type=code&code_challenge=abc&code_challenge_method=S256"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_requires_s256_challenge() {
    let app = build_test_router();
    let client_id = register(&app).await;

    let missing = authorize_uri(&client_id, "").replace(&format!("code_challenge={CHALLENGE}&"), "");
    let plain = authorize_uri(&client_id, "")
        .replace("code_challenge_method=S256", "code_challenge_method=plain");
    let absent = authorize_uri(&client_id, "").replace("&code_challenge_method=S256", "");

    for uri in [missing, plain, absent] {
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {uri}");
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }
}

#[tokio::test]
async fn test_authorize_unknown_client() {
    let app = build_test_router();

    let response = app.oneshot(get(&authorize_uri("nonexistent", ""))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_authorize_unregistered_redirect_uri() {
    let app = build_test_router();
    let client_id = register(&app).await;

    let uri = authorize_uri(&client_id, "")
        .replace(&*urlencoding::encode(REDIRECT_URI), &urlencoding::encode("https://evil.example/cb"));
    let response = app.oneshot(get(&uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_authorize_seeded_client() {
    let app = build_seeded_router().await;

    let response = app
        .oneshot(get(&authorize_uri("dashboard-cli", "&scope=admin:read")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_login_page_without_cookie() {
    let app = build_test_router();

    let response = app.oneshot(get("/mcp/authorize")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("Authorization failed"));
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_token_unsupported_grant_type() {
    let app = build_test_router();

    let response = app
        .oneshot(post(
            "/oauth/token",
            "application/x-www-form-urlencoded",
            "grant_type=client_credentials".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    assert_eq!(json_body(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_token_missing_parameters() {
    let app = build_test_router();

    let response = app
        .oneshot(post(
            "/oauth/token",
            "application/x-www-form-urlencoded",
            "grant_type=authorization_code&code=abc".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_token_unknown_code() {
    let app = build_test_router();
    let client_id = register(&app).await;

    let body = serde_urlencoded::to_string([
        ("grant_type", "authorization_code"),
        ("code", "does-not-exist"),
        ("redirect_uri", REDIRECT_URI),
        ("code_verifier", "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
        ("client_id", client_id.as_str()),
    ])
    .unwrap();
    let response = app
        .oneshot(post("/oauth/token", "application/x-www-form-urlencoded", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_token_unknown_refresh_token() {
    let app = build_test_router();

    let response = app
        .oneshot(post(
            "/oauth/token",
            "application/json",
            json!({ "grant_type": "refresh_token", "refresh_token": "bogus" }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_token_json_without_content_type() {
    let app = build_test_router();

    let response = app
        .oneshot(
            Request::post("/oauth/token")
                .header("host", "example.com")
                .body(Body::from(
                    json!({ "grant_type": "refresh_token", "refresh_token": "bogus" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_grant");
}

// ─── Revocation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_revoke_unknown_token_form() {
    let app = build_test_router();

    let response = app
        .oneshot(post(
            "/oauth/revoke",
            "application/x-www-form-urlencoded",
            "token=nonexistent&token_type_hint=access_token".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "success": true }));
}

#[tokio::test]
async fn test_revoke_unknown_token_json() {
    let app = build_test_router();

    let response = app
        .oneshot(post("/oauth/revoke", "application/json", json!({ "token": "nope" }).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "success": true }));
}

#[tokio::test]
async fn test_revoke_json_without_json_content_type() {
    let app = build_test_router();
    let body = json!({ "token": "abc" }).to_string();

    let response = app
        .clone()
        .oneshot(
            Request::post("/oauth/revoke")
                .header("host", "example.com")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "success": true }));

    let response = app.oneshot(post("/oauth/revoke", "text/plain", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "success": true }));
}

#[tokio::test]
async fn test_revoke_requires_token() {
    let app = build_test_router();

    let response = app
        .oneshot(post("/oauth/revoke", "application/x-www-form-urlencoded", String::new()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

// ─── Protected Resource ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_resource_requires_bearer() {
    let app = build_test_router();

    let response = app.oneshot(get("/mcp")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert_eq!(
        challenge,
        format!(r#"Bearer resource_metadata="{BASE_URL}/.well-known/oauth-protected-resource""#)
    );
}

#[tokio::test]
async fn test_resource_rejects_unknown_token() {
    let app = build_test_router();

    let response = app
        .oneshot(
            Request::get("/mcp")
                .header("host", "example.com")
                .header("x-forwarded-proto", "https")
                .header(header::AUTHORIZATION, "Bearer not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.contains(r#"error="invalid_token""#));
}
