//! Gateway route table configuration
//!
//! Loaded from a TOML file (`GATEWAY_ROUTES_FILE`) when one is given,
//! otherwise from the built-in defaults. Either way `GATEWAY__*` environment
//! variables override individual values, e.g.
//! `GATEWAY__HTTP_CLIENT__REQUEST_TIMEOUT_SECS=10`.

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::models::{AccessRuleDefinition, FilterDefinition, PredicateDefinition, RouteDefinition};
use crate::router::Router;
use crate::security::{default_access_rules, AccessRules};

/// Upstream HTTP client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_pool_idle_timeout() -> u64 {
    90
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteDefinition>,
    #[serde(default = "default_access_rules")]
    pub access_rules: Vec<AccessRuleDefinition>,
    #[serde(default)]
    pub http_client: HttpClientConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            routes: default_routes(),
            access_rules: default_access_rules(),
            http_client: HttpClientConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load the route table, layering `GATEWAY__*` overrides on top
    pub fn load(path: Option<&Path>) -> shared::Result<Self> {
        let builder = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading gateway route table");
                ConfigBuilder::builder().add_source(File::from(path).format(FileFormat::Toml))
            }
            None => {
                info!("Using built-in gateway route table");
                ConfigBuilder::builder().add_source(
                    ConfigBuilder::try_from(&GatewayConfig::default())
                        .map_err(|e| shared::Error::config(e.to_string()))?,
                )
            }
        };

        let config: GatewayConfig = builder
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| shared::Error::config(format!("Invalid gateway configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document (no environment overrides)
    pub fn from_toml(document: &str) -> shared::Result<Self> {
        let config: GatewayConfig = ConfigBuilder::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| shared::Error::config(format!("Invalid gateway configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Compile routes and rules once to surface configuration errors early
    pub fn validate(&self) -> shared::Result<()> {
        Router::new(&self.routes)?;
        AccessRules::new(&self.access_rules)?;

        for route in &self.routes {
            if let Some(breaker) = &route.circuit_breaker {
                if breaker.failure_threshold == 0 || breaker.half_open_max_calls == 0 {
                    return Err(shared::Error::config(format!(
                        "Route '{}': circuit breaker failure_threshold and half_open_max_calls must be > 0",
                        route.id
                    )));
                }
            }
        }

        if self.http_client.connect_timeout_secs == 0 || self.http_client.request_timeout_secs == 0
        {
            return Err(shared::Error::config("HTTP client timeouts must be > 0"));
        }
        Ok(())
    }
}

fn service_route(id: &str, uri: &str, prefix: &str) -> RouteDefinition {
    RouteDefinition {
        id: id.to_string(),
        uri: uri.to_string(),
        predicates: vec![PredicateDefinition::Path {
            patterns: vec![format!("{}/**", prefix)],
        }],
        filters: vec![FilterDefinition::TokenRelay],
        circuit_breaker: Some(CircuitBreakerConfig::default()),
    }
}

/// The three wellness hub backends
pub fn default_routes() -> Vec<RouteDefinition> {
    vec![
        service_route(
            "goal-tracking-service",
            "http://goal-tracking-service:8082",
            "/api/goals",
        ),
        service_route("event-service", "http://event-service:8083", "/api/events"),
        service_route(
            "wellness-resource-service",
            "http://wellness-resource-service:8081",
            "/api/resources",
        ),
    ]
}
