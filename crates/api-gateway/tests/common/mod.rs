//! Common test utilities for integration tests
//!
//! Provides token helpers (HS256 and RS256), a throwaway upstream service
//! bound to an ephemeral port, and the `gateway_app!` macro that builds the
//! gateway the same way `main` does (minus CORS, metrics and tracing).

#![allow(dead_code)]

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use api_gateway::{
    circuit_breaker::CircuitBreakerConfig,
    config::GatewayConfig,
    services::TokenVerifier,
    state::{build_http_client, GatewayState},
};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Test configuration constants
pub const TEST_JWT_SECRET: &str = "integration-test-secret-4b1d9c7e";
pub const TEST_REALM: &str = "wellness-hub";
pub const TEST_ISSUER: &str = "http://localhost:8180/realms/wellness-hub";
pub const TEST_KID: &str = "wellness-hub-test";

const RSA_PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/test_rsa_private.pem");
pub const JWKS_FIXTURE: &str = include_str!("../fixtures/test_jwks.json");

/// Build the gateway service for `test::call_service`
///
/// ```ignore
/// let app = gateway_app!(state, verifier).await;
/// ```
macro_rules! gateway_app {
    ($state:expr, $verifier:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(api_gateway::middleware::GatewaySecurity::new(
                    $verifier.clone(),
                    $state.access_rules.clone(),
                ))
                .wrap(api_gateway::middleware::RequestId::new())
                .app_data($state.clone())
                .configure(api_gateway::routes::configure),
        )
    };
}

fn claims(sub: &str, roles: &[&str], iss: &str, exp_offset: i64) -> serde_json::Value {
    let now = Utc::now().timestamp();
    serde_json::json!({
        "sub": sub,
        "iss": iss,
        "iat": now,
        "exp": now + exp_offset,
        "preferred_username": sub,
        "realm_access": { "roles": roles },
    })
}

/// HS256 token for the test realm, valid for an hour
pub fn create_test_jwt(sub: &str, roles: &[&str]) -> String {
    encode(
        &Header::default(),
        &claims(sub, roles, TEST_ISSUER, 3600),
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// HS256 token that expired an hour ago
pub fn create_expired_jwt(sub: &str, roles: &[&str]) -> String {
    encode(
        &Header::default(),
        &claims(sub, roles, TEST_ISSUER, -3600),
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// HS256 token issued by another realm
pub fn create_foreign_realm_jwt(sub: &str, roles: &[&str]) -> String {
    encode(
        &Header::default(),
        &claims(sub, roles, "http://localhost:8180/realms/master", 3600),
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// RS256 token signed with the fixture key
pub fn create_rsa_jwt(kid: Option<&str>, sub: &str, roles: &[&str]) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);

    encode(
        &header,
        &claims(sub, roles, TEST_ISSUER, 3600),
        &EncodingKey::from_rsa_pem(RSA_PRIVATE_KEY).unwrap(),
    )
    .unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

pub fn hs256_verifier() -> Arc<TokenVerifier> {
    Arc::new(TokenVerifier::with_secret(TEST_JWT_SECRET, TEST_REALM))
}

/// Default route table pointed at `upstream`, short timeouts and a
/// breaker that opens after two failures
pub fn gateway_config(upstream: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for route in &mut config.routes {
        route.uri = upstream.to_string();
        route.circuit_breaker = Some(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout_seconds: 3600,
            half_open_max_calls: 1,
        });
    }
    config.http_client.connect_timeout_secs = 1;
    config.http_client.request_timeout_secs = 1;
    config
}

pub fn gateway_state(config: &GatewayConfig) -> web::Data<GatewayState> {
    let client = build_http_client(&config.http_client).unwrap();
    web::Data::new(GatewayState::build(config, client, None).unwrap())
}

/// A base URL nothing listens on
pub fn dead_upstream() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Upstream service that echoes what it received
///
/// - `.../fail` answers 500
/// - `.../slow` answers after 3 seconds
/// - anything else answers 200 with a JSON echo of the request
pub struct Upstream {
    pub base_url: String,
    hits: web::Data<AtomicUsize>,
}

impl Upstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn echo(req: HttpRequest, body: web::Bytes, hits: web::Data<AtomicUsize>) -> HttpResponse {
    hits.fetch_add(1, Ordering::SeqCst);

    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if req.path().ends_with("/fail") {
        return HttpResponse::InternalServerError().json(serde_json::json!({"error": "boom"}));
    }
    if req.path().ends_with("/slow") {
        actix_rt::time::sleep(Duration::from_secs(3)).await;
    }

    HttpResponse::Ok()
        .insert_header(("X-Upstream", "echo"))
        .insert_header(("Keep-Alive", "timeout=5"))
        .json(serde_json::json!({
            "method": req.method().as_str(),
            "path": req.path(),
            "query": req.query_string(),
            "authorization": header("authorization"),
            "x_request_id": header("x-request-id"),
            "x_forwarded_for": header("x-forwarded-for"),
            "x_forwarded_proto": header("x-forwarded-proto"),
            "x_gateway": header("x-gateway"),
            "body": String::from_utf8_lossy(&body),
        }))
}

pub async fn start_upstream() -> Upstream {
    let hits = web::Data::new(AtomicUsize::new(0));
    let server_hits = hits.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_hits.clone())
            .default_service(web::to(echo))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());

    Upstream {
        base_url: format!("http://{}", addr),
        hits,
    }
}

/// Serve a JWK set document at `/realms/wellness-hub/protocol/openid-connect/certs`
pub async fn start_jwks_server(document: &'static str) -> String {
    let server = HttpServer::new(move || {
        App::new().route(
            "/realms/wellness-hub/protocol/openid-connect/certs",
            web::get().to(move || async move {
                HttpResponse::Ok()
                    .content_type("application/json")
                    .body(document)
            }),
        )
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());

    format!(
        "http://{}/realms/wellness-hub/protocol/openid-connect/certs",
        addr
    )
}
