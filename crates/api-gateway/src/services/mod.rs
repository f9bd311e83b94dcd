//! Services used by the gateway request pipeline
//!
//! Token verification and rate limiting live here, separate from the
//! middleware and handlers that call them.

pub mod jwks;
pub mod rate_limiter;
pub mod token_verifier;

pub use jwks::JwksCache;
pub use rate_limiter::{caller_key, CallerRateLimiter, RateLimitError};
pub use token_verifier::TokenVerifier;
