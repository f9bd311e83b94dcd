//! Prometheus Metrics Middleware
//!
//! Collects HTTP metrics for every request the gateway answers, whether the
//! response was relayed from a backend or produced by the gateway itself.
//!
//! # Metrics Exposed
//!
//! - `http_requests_total` - Counter of HTTP requests
//! - `http_request_duration_seconds` - Histogram of request durations
//! - `http_requests_in_flight` - Gauge of concurrent requests
//!
//! Upstream metrics (`gateway_upstream_*`) are recorded by the proxy.
//! Everything is rendered at `/actuator/prometheus`.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::{
    future::{ready, Ready},
    sync::Arc,
    time::Instant,
};

/// Global Prometheus handle for the scrape endpoint
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder (once per process)
///
/// Later calls return the handle installed by the first one.
pub fn init_metrics() -> shared::Result<PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
                shared::Error::internal(format!("Failed to install Prometheus recorder: {}", e))
            })?;

            describe_counter!(
                "http_requests_total",
                "Total number of HTTP requests processed"
            );
            describe_histogram!(
                "http_request_duration_seconds",
                "HTTP request duration in seconds"
            );
            describe_gauge!(
                "http_requests_in_flight",
                "Number of HTTP requests currently being processed"
            );
            describe_counter!(
                "gateway_upstream_requests_total",
                "Requests forwarded to upstream services, by route and outcome"
            );
            describe_histogram!(
                "gateway_upstream_duration_seconds",
                "Time until the upstream response headers arrived"
            );

            Ok(handle)
        })
        .cloned()
}

/// Prometheus metrics middleware for Actix-web
#[derive(Clone)]
pub struct PrometheusMetrics {
    /// Path prefixes to exclude from metrics
    excluded_paths: Arc<Vec<String>>,
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    /// Exclude the actuator endpoints (scrapes and probes)
    pub fn new() -> Self {
        Self::with_excluded_paths(vec!["/actuator".to_string()])
    }

    pub fn with_excluded_paths(paths: Vec<String>) -> Self {
        Self {
            excluded_paths: Arc::new(paths),
        }
    }
}

fn is_excluded(excluded_paths: &[String], path: &str) -> bool {
    excluded_paths.iter().any(|p| path.starts_with(p.as_str()))
}

impl<S, B> Transform<S, ServiceRequest> for PrometheusMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = PrometheusMetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(PrometheusMetricsMiddleware {
            service,
            excluded_paths: self.excluded_paths.clone(),
        }))
    }
}

pub struct PrometheusMetricsMiddleware<S> {
    service: S,
    excluded_paths: Arc<Vec<String>>,
}

impl<S, B> Service<ServiceRequest> for PrometheusMetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_excluded(&self.excluded_paths, req.path()) {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        let start = Instant::now();
        let method = req.method().to_string();
        let path = normalize_path(req.path());

        gauge!("http_requests_in_flight").increment(1.0);
        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            gauge!("http_requests_in_flight").decrement(1.0);

            let status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(e) => e.as_response_error().status_code().as_u16(),
            }
            .to_string();

            counter!(
                "http_requests_total",
                "method" => method.clone(),
                "path" => path.clone(),
                "status" => status.clone()
            )
            .increment(1);

            histogram!(
                "http_request_duration_seconds",
                "method" => method,
                "path" => path,
                "status" => status
            )
            .record(start.elapsed().as_secs_f64());

            result
        })
    }
}

/// Normalize path for metrics labels
///
/// Replaces ids (numbers, UUIDs, 24-char hex document ids) with `{id}` to
/// keep label cardinality bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|part| {
            let is_uuid = part.len() == 36 && part.chars().filter(|c| *c == '-').count() == 4;
            let is_numeric = !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
            let is_document_id = part.len() == 24 && part.chars().all(|c| c.is_ascii_hexdigit());

            if is_uuid || is_numeric || is_document_id {
                "{id}"
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpResponse};

    #[::core::prelude::v1::test]
    fn test_normalize_path_ids() {
        assert_eq!(
            normalize_path("/api/goals/123e4567-e89b-12d3-a456-426614174000"),
            "/api/goals/{id}"
        );
        assert_eq!(
            normalize_path("/api/events/42/register"),
            "/api/events/{id}/register"
        );
        assert_eq!(
            normalize_path("/api/resources/65a1f0c2e4b0a1b2c3d4e5f6"),
            "/api/resources/{id}"
        );
        assert_eq!(normalize_path("/api/resources"), "/api/resources");
    }

    #[::core::prelude::v1::test]
    fn test_excluded_paths() {
        let metrics = PrometheusMetrics::new();
        assert!(is_excluded(&metrics.excluded_paths, "/actuator/prometheus"));
        assert!(!is_excluded(&metrics.excluded_paths, "/api/goals"));
    }

    #[actix_web::test]
    async fn test_middleware_passes_response_through() {
        let app = test::init_service(
            App::new()
                .wrap(PrometheusMetrics::new())
                .route(
                    "/api/goals",
                    web::get().to(|| async { HttpResponse::Ok().finish() }),
                )
                .route(
                    "/api/events",
                    web::get().to(|| async { HttpResponse::ServiceUnavailable().finish() }),
                ),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/api/goals").to_request())
                .await;
        assert!(resp.status().is_success());

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/api/events").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
