//! Shared application state

use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::{GatewayConfig, HttpClientConfig};
use crate::router::Router;
use crate::security::AccessRules;

/// State handed to the proxy and actuator handlers
pub struct GatewayState {
    pub router: Router,
    pub access_rules: Arc<AccessRules>,
    pub client: reqwest::Client,
    /// One breaker per route that configures one
    pub breakers: HashMap<String, Arc<CircuitBreaker>>,
    pub metrics: Option<PrometheusHandle>,
}

impl GatewayState {
    pub fn build(
        config: &GatewayConfig,
        client: reqwest::Client,
        metrics: Option<PrometheusHandle>,
    ) -> shared::Result<Self> {
        let router = Router::new(&config.routes)?;
        let access_rules = Arc::new(AccessRules::new(&config.access_rules)?);

        let breakers = router
            .routes()
            .iter()
            .filter_map(|route| {
                route.circuit_breaker.clone().map(|cb| {
                    (
                        route.id.clone(),
                        Arc::new(CircuitBreaker::new(route.id.clone(), cb)),
                    )
                })
            })
            .collect();

        Ok(Self {
            router,
            access_rules,
            client,
            breakers,
            metrics,
        })
    }

    pub fn breaker(&self, route_id: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(route_id)
    }

    /// Breaker states keyed by route id
    pub async fn breaker_states(&self) -> Vec<(String, CircuitState)> {
        let mut states = Vec::with_capacity(self.breakers.len());
        for (id, breaker) in &self.breakers {
            states.push((id.clone(), breaker.get_state().await));
        }
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

/// Shared upstream client; redirects are passed back to the caller untouched
pub fn build_http_client(config: &HttpClientConfig) -> shared::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| shared::Error::config(format!("Failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_creates_breaker_per_route() {
        let config = GatewayConfig::default();
        let client = build_http_client(&config.http_client).unwrap();
        let state = GatewayState::build(&config, client, None).unwrap();

        assert_eq!(state.router.routes().len(), 3);
        assert!(state.breaker("event-service").is_some());

        let states = state.breaker_states().await;
        assert_eq!(states.len(), 3);
        assert!(states.iter().all(|(_, s)| *s == CircuitState::Closed));
    }
}
