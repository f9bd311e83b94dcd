//! Path-based access rules and the authenticated caller
//!
//! Rules are checked in declaration order and the first rule with a matching
//! pattern decides. A path no rule covers requires an authenticated caller.

use actix_web::http::header::{self, HeaderMap};
use std::collections::BTreeSet;

use crate::models::{Access, AccessRuleDefinition};
use crate::router::PathPattern;

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_STAFF: &str = "staff";

/// Caller identity established from a verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub username: Option<String>,
    pub roles: BTreeSet<String>,
    /// The raw bearer token, relayed to upstreams
    pub token: String,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Outcome of an access check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Permit,
    Unauthenticated,
    Forbidden,
}

#[derive(Debug, Clone)]
struct AccessRule {
    patterns: Vec<PathPattern>,
    access: Access,
}

/// Compiled access rule table
#[derive(Debug, Clone)]
pub struct AccessRules {
    rules: Vec<AccessRule>,
}

impl AccessRules {
    pub fn new(definitions: &[AccessRuleDefinition]) -> shared::Result<Self> {
        let rules = definitions
            .iter()
            .map(|definition| {
                if definition.patterns.is_empty() {
                    return Err(shared::Error::config("Access rule needs a pattern"));
                }
                if let Access::HasAnyRole { roles } = &definition.access {
                    if roles.is_empty() {
                        return Err(shared::Error::config(
                            "has_any_role access rule needs at least one role",
                        ));
                    }
                }

                let patterns = definition
                    .patterns
                    .iter()
                    .map(|p| PathPattern::parse(p))
                    .collect::<shared::Result<Vec<_>>>()?;

                Ok(AccessRule {
                    patterns,
                    access: definition.access.clone(),
                })
            })
            .collect::<shared::Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Access required for `path`
    pub fn required_access(&self, path: &str) -> &Access {
        const AUTHENTICATED: &Access = &Access::Authenticated;

        self.rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| p.matches(path)))
            .map(|rule| &rule.access)
            .unwrap_or(AUTHENTICATED)
    }

    pub fn decide(&self, path: &str, principal: Option<&Principal>) -> AccessDecision {
        match (self.required_access(path), principal) {
            (Access::PermitAll, _) => AccessDecision::Permit,
            (_, None) => AccessDecision::Unauthenticated,
            (Access::Authenticated, Some(_)) => AccessDecision::Permit,
            (Access::HasRole { role }, Some(p)) if p.has_role(role) => AccessDecision::Permit,
            (Access::HasAnyRole { roles }, Some(p)) if roles.iter().any(|r| p.has_role(r)) => {
                AccessDecision::Permit
            }
            (_, Some(_)) => AccessDecision::Forbidden,
        }
    }
}

/// Bearer token from the `Authorization` header
///
/// Any other scheme, or an empty token, counts as no token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Rule table of the wellness hub gateway
pub fn default_access_rules() -> Vec<AccessRuleDefinition> {
    let mut rules = vec![AccessRuleDefinition::new(
        [
            "/actuator/**",
            "/swagger-ui/**",
            "/v3/api-docs/**",
            "/webjars/**",
        ],
        Access::PermitAll,
    )];

    // Each backend publishes its own API docs behind the gateway
    for prefix in ["/api/resources", "/api/goals", "/api/events"] {
        rules.push(AccessRuleDefinition::new(
            [
                "swagger-ui.html",
                "swagger-ui/**",
                "api-docs/**",
                "v3/api-docs/**",
                "webjars/**",
            ]
            .iter()
            .map(|suffix| format!("{}/{}", prefix, suffix)),
            Access::PermitAll,
        ));
    }

    rules.extend([
        AccessRuleDefinition::new(
            ["/api/goals/**"],
            Access::HasRole {
                role: ROLE_STUDENT.to_string(),
            },
        ),
        AccessRuleDefinition::new(
            ["/api/events/*/register", "/api/events/*/unregister"],
            Access::HasRole {
                role: ROLE_STUDENT.to_string(),
            },
        ),
        AccessRuleDefinition::new(
            ["/api/events/**"],
            Access::HasAnyRole {
                roles: vec![ROLE_STUDENT.to_string(), ROLE_STAFF.to_string()],
            },
        ),
        AccessRuleDefinition::new(
            ["/api/resources/**"],
            Access::HasRole {
                role: ROLE_STAFF.to_string(),
            },
        ),
    ]);

    rules
}
