//! API Gateway for the Wellness Hub
//!
//! Routes `/api/goals`, `/api/events` and `/api/resources` to their backend
//! services behind token verification and role checks.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use api_gateway::{
    config::GatewayConfig,
    middleware::{self, GatewaySecurity, PrometheusMetrics, RequestId},
    routes,
    services::TokenVerifier,
    state::{build_http_client, GatewayState},
};
use shared::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    shared::init_tracing();

    tracing::info!("Starting API Gateway...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let gateway_config = GatewayConfig::load(config.server.routes_file.as_deref().map(Path::new))
        .context("Failed to load gateway route table")?;

    let metrics = middleware::init_metrics().context("Failed to initialize metrics")?;
    let client =
        build_http_client(&gateway_config.http_client).context("Failed to build HTTP client")?;

    let verifier = Arc::new(
        TokenVerifier::from_config(&config.auth, client.clone())
            .context("Failed to configure token verification")?,
    );
    let state = web::Data::new(
        GatewayState::build(&gateway_config, client, Some(metrics))
            .context("Invalid gateway route table")?,
    );

    for route in state.router.routes() {
        tracing::info!(route_id = %route.id, uri = %route.base_uri, "Route registered");
    }

    let server_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("API Gateway listening on {}", server_addr);

    let max_body_bytes = config.server.max_body_bytes;
    let cors_config = config.cors.clone();

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            // Innermost: authenticate and authorize
            .wrap(GatewaySecurity::new(
                verifier.clone(),
                state.access_rules.clone(),
            ))
            .wrap(RequestId::new())
            .wrap(PrometheusMetrics::new())
            .wrap(middleware::cors(&cors_config))
            // Outermost: request span
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .configure(routes::configure)
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind to {}", server_addr))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}
