//! Wellness Hub API Gateway
//!
//! Single entry point in front of the goal-tracking, event and wellness
//! resource services. Incoming requests are authenticated, checked against
//! path access rules, matched to a route and forwarded to the backend with
//! the caller's token relayed.
//!
//! Exposed as a library for the binaries and integration tests.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod proxy;
pub mod router;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;
