//! Route configuration for the gateway
//!
//! The gateway's own endpoints are registered first; every other request
//! falls through to the proxy.

use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{handlers, openapi::ApiDoc, proxy};

/// Configure all routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/actuator")
            .route("/health", web::get().to(handlers::health))
            .route("/info", web::get().to(handlers::info))
            .route("/prometheus", web::get().to(handlers::prometheus)),
    )
    // Swagger UI also serves the document at /v3/api-docs
    .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/v3/api-docs", ApiDoc::openapi()))
    .default_service(web::to(proxy::forward));
}
