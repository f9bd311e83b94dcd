//! Route, filter and access-rule definitions as written in the route table
//!
//! ```toml
//! [[routes]]
//! id = "goal-tracking-service"
//! uri = "http://goal-tracking-service:8082"
//! predicates = [{ type = "path", patterns = ["/api/goals", "/api/goals/**"] }]
//! filters = [{ type = "token_relay" }]
//!
//! [[access_rules]]
//! patterns = ["/api/goals/**"]
//! access = { type = "has_role", role = "student" }
//! ```

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;

/// A destination service and the requests that go to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub id: String,
    /// Base URI of the upstream (`http` or `https`)
    pub uri: String,
    #[serde(default)]
    pub predicates: Vec<PredicateDefinition>,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

/// Request predicate; a route matches when all of its predicates match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredicateDefinition {
    /// Any of the Ant-style patterns matches the request path
    Path { patterns: Vec<String> },
    /// Any of the patterns matches the Host header (port ignored)
    Host { patterns: Vec<String> },
    /// The header is present and its value fully matches `regex`
    Header { name: String, regex: String },
    /// The request method is one of `methods`
    Method { methods: Vec<String> },
}

/// Request/response transformer, applied in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterDefinition {
    /// Forward the caller's bearer token to the upstream
    TokenRelay,
    /// Drop the first `parts` path segments
    StripPrefix { parts: usize },
    AddRequestHeader { name: String, value: String },
    RemoveRequestHeader { name: String },
    AddResponseHeader { name: String, value: String },
    /// Token bucket per caller
    RequestRateLimiter { replenish_per_second: u32, burst: u32 },
}

/// Access required for the paths a rule covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Access {
    PermitAll,
    Authenticated,
    HasRole { role: String },
    HasAnyRole { roles: Vec<String> },
}

/// Path patterns and the access they require
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRuleDefinition {
    pub patterns: Vec<String>,
    pub access: Access,
}

impl AccessRuleDefinition {
    pub fn new<I, S>(patterns: I, access: Access) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            access,
        }
    }
}
