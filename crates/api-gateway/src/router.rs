//! Route matching
//!
//! Compiles [`RouteDefinition`]s into matchers once at startup. Routes are
//! evaluated in declaration order and the first route whose predicates all
//! match wins.

use actix_web::http::{header::HeaderMap, Method};
use regex::Regex;
use reqwest::Url;
use std::collections::HashSet;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::GatewayError;
use crate::filters::FilterChain;
use crate::models::{PredicateDefinition, RouteDefinition};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment
    Any,
    /// `**`: zero or more trailing segments
    Rest,
}

/// Ant-style path pattern (`/api/events/*/register`, `/api/goals/**`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> shared::Result<Self> {
        if !pattern.starts_with('/') {
            return Err(shared::Error::config(format!(
                "Path pattern '{}' must start with '/'",
                pattern
            )));
        }

        let parts: Vec<&str> = split_path(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());

        for (index, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" if index + 1 == parts.len() => Segment::Rest,
                "**" => {
                    return Err(shared::Error::config(format!(
                        "Path pattern '{}': '**' is only allowed as the last segment",
                        pattern
                    )))
                }
                "*" => Segment::Any,
                literal if literal.contains('*') => {
                    return Err(shared::Error::config(format!(
                        "Path pattern '{}': partial wildcards are not supported",
                        pattern
                    )))
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = split_path(path).collect();
        let mut index = 0;

        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Any => {
                    if index >= parts.len() {
                        return false;
                    }
                }
                Segment::Literal(literal) => {
                    if parts.get(index) != Some(&literal.as_str()) {
                        return false;
                    }
                }
            }
            index += 1;
        }

        index == parts.len()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Non-empty path segments; duplicate and trailing slashes are insignificant
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Request path after [`canonical_path`], stored in request extensions by the
/// security middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath(pub String);

/// The one path that access rules, route matching and the upstream all see
///
/// Percent-encoded unreserved characters are decoded, `.` segments and
/// duplicate slashes are dropped, and a trailing slash is kept. A `..`
/// segment (in any encoding) is rejected, as is a malformed escape.
pub fn canonical_path(raw: &str) -> Result<String, GatewayError> {
    let decoded = decode_unreserved(raw)
        .ok_or_else(|| GatewayError::BadRequest("Malformed percent-encoding in path".into()))?;

    let mut canonical = String::with_capacity(decoded.len());
    for segment in split_path(&decoded) {
        match segment {
            "." => continue,
            ".." => {
                return Err(GatewayError::BadRequest(
                    "Path traversal segments are not allowed".into(),
                ))
            }
            segment => {
                canonical.push('/');
                canonical.push_str(segment);
            }
        }
    }

    if canonical.is_empty() {
        canonical.push('/');
    } else if decoded.ends_with('/') {
        canonical.push('/');
    }
    Ok(canonical)
}

/// Decode `%XX` escapes of unreserved characters (RFC 3986 §2.3); other
/// escapes keep their encoded form
fn decode_unreserved(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] != b'%' {
            let ch = raw[index..].chars().next()?;
            out.push(ch);
            index += ch.len_utf8();
            continue;
        }

        let escape = raw.get(index + 1..index + 3)?;
        let value = u8::from_str_radix(escape, 16).ok()?;
        if value.is_ascii_alphanumeric() || matches!(value, b'-' | b'.' | b'_' | b'~') {
            out.push(value as char);
        } else {
            out.push('%');
            out.push_str(&escape.to_ascii_uppercase());
        }
        index += 3;
    }

    Some(out)
}

/// Host pattern where `*` stands for one DNS label
#[derive(Debug, Clone)]
struct HostPattern {
    labels: Vec<String>,
}

impl HostPattern {
    fn parse(pattern: &str) -> Self {
        Self {
            labels: pattern
                .to_ascii_lowercase()
                .split('.')
                .map(str::to_string)
                .collect(),
        }
    }

    fn matches(&self, host: &str) -> bool {
        let host = strip_port(host).to_ascii_lowercase();
        let labels: Vec<&str> = host.split('.').collect();

        labels.len() == self.labels.len()
            && self
                .labels
                .iter()
                .zip(labels)
                .all(|(pattern, label)| pattern == "*" || pattern == label)
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: [::1]:8080
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }

    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Path(Vec<PathPattern>),
    Host(Vec<HostPattern>),
    Header { name: String, regex: Regex },
    Method(Vec<Method>),
}

impl Predicate {
    fn compile(definition: &PredicateDefinition) -> shared::Result<Self> {
        match definition {
            PredicateDefinition::Path { patterns } => {
                if patterns.is_empty() {
                    return Err(shared::Error::config("Path predicate needs a pattern"));
                }
                let patterns = patterns
                    .iter()
                    .map(|p| PathPattern::parse(p))
                    .collect::<shared::Result<Vec<_>>>()?;
                Ok(Predicate::Path(patterns))
            }
            PredicateDefinition::Host { patterns } => Ok(Predicate::Host(
                patterns.iter().map(|p| HostPattern::parse(p)).collect(),
            )),
            PredicateDefinition::Header { name, regex } => {
                let anchored = format!("^(?:{})$", regex);
                let regex = Regex::new(&anchored).map_err(|e| {
                    shared::Error::config(format!("Invalid header regex '{}': {}", regex, e))
                })?;
                Ok(Predicate::Header {
                    name: name.to_ascii_lowercase(),
                    regex,
                })
            }
            PredicateDefinition::Method { methods } => {
                let methods = methods
                    .iter()
                    .map(|m| {
                        Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                            shared::Error::config(format!("Invalid HTTP method '{}'", m))
                        })
                    })
                    .collect::<shared::Result<Vec<_>>>()?;
                Ok(Predicate::Method(methods))
            }
        }
    }

    fn matches(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        match self {
            Predicate::Path(patterns) => patterns.iter().any(|p| p.matches(path)),
            Predicate::Host(patterns) => headers
                .get("host")
                .and_then(|v| v.to_str().ok())
                .map(|host| patterns.iter().any(|p| p.matches(host)))
                .unwrap_or(false),
            Predicate::Header { name, regex } => headers
                .get_all(name.as_str())
                .filter_map(|v| v.to_str().ok())
                .any(|v| regex.is_match(v)),
            Predicate::Method(methods) => methods.contains(method),
        }
    }
}

/// A compiled route
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    /// Upstream base URI without trailing slash
    pub base_uri: String,
    predicates: Vec<Predicate>,
    pub filters: FilterChain,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Route {
    pub fn compile(definition: &RouteDefinition) -> shared::Result<Self> {
        if definition.id.trim().is_empty() {
            return Err(shared::Error::config("Route id must not be empty"));
        }

        let url = Url::parse(&definition.uri).map_err(|e| {
            shared::Error::config(format!(
                "Route '{}' has an invalid uri '{}': {}",
                definition.id, definition.uri, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(shared::Error::config(format!(
                "Route '{}' uri must use http or https",
                definition.id
            )));
        }

        let predicates = definition
            .predicates
            .iter()
            .map(Predicate::compile)
            .collect::<shared::Result<Vec<_>>>()?;

        Ok(Self {
            id: definition.id.clone(),
            base_uri: definition.uri.trim_end_matches('/').to_string(),
            predicates,
            filters: FilterChain::compile(&definition.filters)?,
            circuit_breaker: definition.circuit_breaker.clone(),
        })
    }

    /// A route without predicates never matches
    pub fn matches(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        !self.predicates.is_empty()
            && self
                .predicates
                .iter()
                .all(|p| p.matches(method, path, headers))
    }
}

/// Ordered route table
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new(definitions: &[RouteDefinition]) -> shared::Result<Self> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(definitions.len());

        for definition in definitions {
            if !seen.insert(definition.id.as_str()) {
                return Err(shared::Error::config(format!(
                    "Duplicate route id '{}'",
                    definition.id
                )));
            }
            routes.push(Route::compile(definition)?);
        }

        Ok(Self { routes })
    }

    /// First route whose predicates all match
    pub fn route(&self, method: &Method, path: &str, headers: &HeaderMap) -> Option<&Route> {
        self.routes
            .iter()
            .find(|route| route.matches(method, path, headers))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
