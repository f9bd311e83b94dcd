//! Request handlers for the gateway's own endpoints
//!
//! Everything else is forwarded by [`crate::proxy::forward`].

pub mod actuator;

pub use actuator::*;
