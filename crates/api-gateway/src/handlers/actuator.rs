//! Actuator endpoints (health, info, Prometheus scrape)

use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::circuit_breaker::CircuitState;
use crate::state::GatewayState;

/// Health of one component
#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[schema(value_type = Object)]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `UP` or `DOWN`
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Build information
#[derive(Debug, Serialize, ToSchema)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
}

const UP: &str = "UP";
const DOWN: &str = "DOWN";

/// Gateway health
///
/// DOWN (503) when every configured circuit breaker is open.
#[utoipa::path(
    get,
    path = "/actuator/health",
    tag = "Actuator",
    responses(
        (status = 200, description = "Gateway is healthy", body = HealthResponse),
        (status = 503, description = "All upstream circuits are open", body = HealthResponse)
    )
)]
pub async fn health(state: web::Data<GatewayState>) -> impl Responder {
    let breaker_states = state.breaker_states().await;
    let open: Vec<&str> = breaker_states
        .iter()
        .filter(|(_, s)| *s == CircuitState::Open)
        .map(|(id, _)| id.as_str())
        .collect();

    let all_open = !breaker_states.is_empty() && open.len() == breaker_states.len();
    let breakers_status = if all_open { DOWN } else { UP };

    let mut breaker_details = BTreeMap::new();
    for (id, s) in &breaker_states {
        breaker_details.insert(id.clone(), serde_json::json!(s.to_string()));
    }

    let mut components = BTreeMap::new();
    components.insert(
        "routes".to_string(),
        ComponentHealth {
            status: UP.to_string(),
            details: BTreeMap::from([(
                "count".to_string(),
                serde_json::json!(state.router.routes().len()),
            )]),
        },
    );
    components.insert(
        "circuitBreakers".to_string(),
        ComponentHealth {
            status: breakers_status.to_string(),
            details: breaker_details,
        },
    );

    let response = HealthResponse {
        status: breakers_status.to_string(),
        components,
    };

    if all_open {
        tracing::warn!(open = ?open, "Health DOWN: every upstream circuit is open");
        HttpResponse::ServiceUnavailable().json(response)
    } else {
        HttpResponse::Ok().json(response)
    }
}

#[utoipa::path(
    get,
    path = "/actuator/info",
    tag = "Actuator",
    responses((status = 200, description = "Build information", body = InfoResponse))
)]
pub async fn info() -> impl Responder {
    HttpResponse::Ok().json(InfoResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus scrape endpoint
#[utoipa::path(
    get,
    path = "/actuator/prometheus",
    tag = "Actuator",
    responses(
        (status = 200, description = "Metrics in Prometheus text format", content_type = "text/plain"),
        (status = 404, description = "Metrics recorder not installed")
    )
)]
pub async fn prometheus(state: web::Data<GatewayState>) -> impl Responder {
    match &state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}
