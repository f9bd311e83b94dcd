//! Shared library for the Wellness Hub edge services
//!
//! This crate provides common functionality used by the gateway and the
//! seed tooling:
//! - Configuration management (environment + `.env`)
//! - Error handling types
//! - Database connection pooling for `goals_db`
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod error;

// Re-export commonly used types
pub use config::{AuthConfig, Config, CorsConfig, DatabaseConfig, ServerConfig};
pub use db::DbPool;
pub use error::{Error, Result};

/// Initialize tracing subscriber for structured logging
///
/// `RUST_LOG` controls the filter. `LOG_FORMAT=json` switches the fmt layer
/// to JSON lines for log shippers.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shared=debug,api_gateway=debug,goal_seed=debug,info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
