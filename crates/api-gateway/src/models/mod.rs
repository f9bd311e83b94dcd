//! Data types for gateway configuration, tokens and responses

pub mod auth;
pub mod common;
pub mod routes;

// Re-exports
pub use auth::*;
pub use common::*;
pub use routes::*;
