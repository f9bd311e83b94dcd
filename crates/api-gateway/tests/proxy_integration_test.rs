//! Integration tests for upstream forwarding
//!
//! Each test starts an echo upstream on an ephemeral port and drives the
//! gateway through `actix_web::test`.

#[macro_use]
mod common;

use actix_web::{http::StatusCode, test};
use api_gateway::models::{FilterDefinition, PredicateDefinition, RouteDefinition};
use common::*;

fn peer() -> std::net::SocketAddr {
    "192.0.2.10:50123".parse().unwrap()
}

#[actix_web::test]
async fn test_goal_request_forwarded_with_token_relay() {
    let upstream = start_upstream().await;
    let state = gateway_state(&gateway_config(&upstream.base_url));
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let token = create_test_jwt("student-1", &["student"]);
    let req = test::TestRequest::get()
        .uri("/api/goals/42?status=in-progress")
        .insert_header(bearer(&token))
        .insert_header(("X-Request-ID", "trace-abc"))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-upstream").unwrap(), "echo");
    assert!(resp.headers().get("keep-alive").is_none());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["method"], "GET");
    assert_eq!(body["path"], "/api/goals/42");
    assert_eq!(body["query"], "status=in-progress");
    assert_eq!(body["authorization"], format!("Bearer {}", token));
    assert_eq!(body["x_request_id"], "trace-abc");
    assert_eq!(body["x_forwarded_for"], "192.0.2.10");
    assert_eq!(body["x_forwarded_proto"], "http");
    assert_eq!(upstream.hits(), 1);
}

#[actix_web::test]
async fn test_request_body_forwarded() {
    let upstream = start_upstream().await;
    let state = gateway_state(&gateway_config(&upstream.base_url));
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let token = create_test_jwt("student-1", &["student"]);
    let req = test::TestRequest::post()
        .uri("/api/events/5/register")
        .insert_header(bearer(&token))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(r#"{"note":"see you there"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], r#"{"note":"see you there"}"#);
}

#[actix_web::test]
async fn test_unknown_path_is_404() {
    let upstream = start_upstream().await;
    let state = gateway_state(&gateway_config(&upstream.base_url));
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let token = create_test_jwt("student-1", &["student"]);
    let req = test::TestRequest::get()
        .uri("/api/unknown")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(upstream.hits(), 0);
}

#[actix_web::test]
async fn test_dead_upstream_is_502() {
    let state = gateway_state(&gateway_config(&dead_upstream()));
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let token = create_test_jwt("staff-1", &["staff"]);
    let req = test::TestRequest::get()
        .uri("/api/resources")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "bad_gateway");
}

#[actix_web::test]
async fn test_slow_upstream_is_504() {
    let upstream = start_upstream().await;
    let state = gateway_state(&gateway_config(&upstream.base_url));
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let token = create_test_jwt("staff-1", &["staff"]);
    let req = test::TestRequest::get()
        .uri("/api/resources/slow")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[actix_web::test]
async fn test_circuit_opens_after_upstream_failures() {
    let upstream = start_upstream().await;
    let state = gateway_state(&gateway_config(&upstream.base_url));
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let token = create_test_jwt("student-1", &["student"]);

    // Threshold is two failures; upstream 5xx responses are relayed as-is
    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/api/goals/fail")
            .insert_header(bearer(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert_eq!(upstream.hits(), 2);

    let req = test::TestRequest::get()
        .uri("/api/goals/1")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "service_unavailable");
    assert_eq!(upstream.hits(), 2);

    // Other routes keep their own breaker
    let staff = create_test_jwt("staff-1", &["staff"]);
    let req = test::TestRequest::get()
        .uri("/api/resources")
        .insert_header(bearer(&staff))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::OK
    );
}

#[actix_web::test]
async fn test_strip_prefix_and_header_filters() {
    let upstream = start_upstream().await;
    let mut config = gateway_config(&upstream.base_url);
    config.routes.insert(
        0,
        RouteDefinition {
            id: "goal-service-v2".to_string(),
            uri: upstream.base_url.clone(),
            predicates: vec![PredicateDefinition::Path {
                patterns: vec!["/api/goals/v2/**".to_string()],
            }],
            filters: vec![
                FilterDefinition::TokenRelay,
                FilterDefinition::StripPrefix { parts: 3 },
                FilterDefinition::AddRequestHeader {
                    name: "X-Gateway".to_string(),
                    value: "wellness-hub".to_string(),
                },
                FilterDefinition::AddResponseHeader {
                    name: "X-Route".to_string(),
                    value: "goal-service-v2".to_string(),
                },
            ],
            circuit_breaker: None,
        },
    );
    let state = gateway_state(&config);
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let token = create_test_jwt("student-1", &["student"]);
    let req = test::TestRequest::get()
        .uri("/api/goals/v2/goals/7")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-route").unwrap(), "goal-service-v2");

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["path"], "/goals/7");
    assert_eq!(body["x_gateway"], "wellness-hub");
}

#[actix_web::test]
async fn test_public_backend_docs_forwarded_without_token() {
    let upstream = start_upstream().await;
    let state = gateway_state(&gateway_config(&upstream.base_url));
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let req = test::TestRequest::get()
        .uri("/api/goals/v3/api-docs")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["path"], "/api/goals/v3/api-docs");
    assert!(body["authorization"].is_null());
}

#[actix_web::test]
async fn test_rejected_request_does_not_hold_trial_slot() {
    use api_gateway::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use std::time::Duration;

    let upstream = start_upstream().await;
    let mut config = gateway_config(&upstream.base_url);
    let goals = &mut config.routes[0];
    assert_eq!(goals.id, "goal-tracking-service");
    goals.filters.push(FilterDefinition::RequestRateLimiter {
        replenish_per_second: 1,
        burst: 1,
    });
    goals.circuit_breaker = Some(CircuitBreakerConfig {
        failure_threshold: 1,
        recovery_timeout_seconds: 0,
        half_open_max_calls: 1,
    });
    let state = gateway_state(&config);
    let verifier = hs256_verifier();
    let app = gateway_app!(state, verifier).await;

    let token = create_test_jwt("student-1", &["student"]);
    let get = |uri: &str| {
        test::TestRequest::get()
            .uri(uri)
            .insert_header(bearer(&token))
            .to_request()
    };

    // Opens the circuit
    let resp = test::call_service(&app, get("/api/goals/fail")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Rate limited before the breaker is consulted
    let resp = test::call_service(&app, get("/api/goals/1")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    actix_rt::time::sleep(Duration::from_millis(1100)).await;

    // The trial call is still available and closes the circuit
    let resp = test::call_service(&app, get("/api/goals/1")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        state.breaker("goal-tracking-service").unwrap().get_state().await,
        CircuitState::Closed
    );
    assert_eq!(upstream.hits(), 2);
}
