//! CORS Middleware
//!
//! Cross-origin policy for browser frontends calling the gateway.
//!
//! # Origins
//!
//! - `ALLOWED_ORIGINS` (comma-separated) lists the exact origins allowed
//! - With no list, debug builds allow `http://localhost:*` and
//!   `http://127.0.0.1:*`; release builds allow nothing
//! - `*` and non-http(s) entries are ignored with a warning

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use shared::CorsConfig;
use tracing::{debug, warn};

use super::request_id::REQUEST_ID_HEADER;

/// Origins from the configuration that are usable as exact matches
fn valid_origins(config: &CorsConfig) -> Vec<String> {
    config
        .allowed_origins
        .iter()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|origin| {
            if origin == "*" {
                warn!("Wildcard (*) CORS origin ignored; list explicit origins instead");
                return false;
            }
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                warn!(origin = %origin, "Invalid CORS origin ignored");
                return false;
            }
            true
        })
        .collect()
}

fn is_local_origin(origin: &str) -> bool {
    ["http://localhost", "http://127.0.0.1"].iter().any(|prefix| {
        origin
            .strip_prefix(prefix)
            .map(|rest| rest.is_empty() || rest.starts_with(':'))
            .unwrap_or(false)
    })
}

/// Create the CORS middleware
pub fn cors(config: &CorsConfig) -> Cors {
    let origins = valid_origins(config);
    let mut cors = Cors::default();

    if origins.is_empty() {
        if cfg!(debug_assertions) {
            debug!("No CORS origins configured; allowing local origins (debug build)");
            cors = cors.allowed_origin_fn(|origin, _req_head| {
                origin.to_str().map(is_local_origin).unwrap_or(false)
            });
        } else {
            warn!("No CORS origins configured. Cross-origin requests will be blocked.");
        }
    } else {
        for origin in &origins {
            cors = cors.allowed_origin(origin);
        }
        debug!(count = origins.len(), "CORS allowed origins configured");
    }

    cors.allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers(vec![
            header::CONTENT_TYPE,
            header::RETRY_AFTER,
            header::WWW_AUTHENTICATE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .max_age(3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::Method, test, web, App, HttpResponse};

    async fn test_handler() -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({"status": "UP"}))
    }

    fn config(origins: &[&str]) -> CorsConfig {
        CorsConfig {
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[::core::prelude::v1::test]
    fn test_valid_origins_filter() {
        let origins = valid_origins(&config(&[
            "https://hub.example.edu/",
            "*",
            "ftp://files",
            " http://localhost:3000 ",
        ]));
        assert_eq!(
            origins,
            vec!["https://hub.example.edu", "http://localhost:3000"]
        );
    }

    #[::core::prelude::v1::test]
    fn test_is_local_origin() {
        assert!(is_local_origin("http://localhost:5173"));
        assert!(is_local_origin("http://127.0.0.1"));
        assert!(!is_local_origin("http://localhost.evil.com"));
        assert!(!is_local_origin("https://hub.example.edu"));
    }

    #[actix_web::test]
    async fn test_preflight_from_allowed_origin() {
        let app = test::init_service(
            App::new()
                .wrap(cors(&config(&["https://hub.example.edu"])))
                .route("/api/goals", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/api/goals")
            .insert_header(("Origin", "https://hub.example.edu"))
            .insert_header(("Access-Control-Request-Method", "GET"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://hub.example.edu"
        );
    }

    #[actix_web::test]
    async fn test_disallowed_origin_gets_no_cors_headers() {
        let app = test::init_service(
            App::new()
                .wrap(cors(&config(&["https://hub.example.edu"])))
                .route("/api/goals", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/goals")
            .insert_header(("Origin", "http://evil.com"))
            .to_request();
        let resp = test::try_call_service(&app, req).await;

        if let Ok(resp) = resp {
            assert!(!resp.headers().contains_key("access-control-allow-origin"));
        }
    }
}
