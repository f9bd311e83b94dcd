//! Middleware for the API Gateway
//!
//! Wrapped in `main` from innermost to outermost: security, request id,
//! metrics, CORS, tracing.

pub mod authentication;
pub mod cors;
pub mod metrics;
pub mod request_id;

pub use authentication::GatewaySecurity;
pub use cors::cors;
pub use metrics::{init_metrics, PrometheusMetrics};
pub use request_id::{request_id, RequestId, RequestIdExt, REQUEST_ID_HEADER};
