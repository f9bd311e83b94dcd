//! Route filters
//!
//! A route's filters run in declaration order over the outgoing request and
//! then over the upstream response headers. Header names and values are
//! validated when the chain is compiled.

use actix_web::http::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method,
};
use actix_web::web::Bytes;

use crate::error::GatewayError;
use crate::models::FilterDefinition;
use crate::security::Principal;
use crate::services::{caller_key, CallerRateLimiter};

/// Request as it will be sent upstream
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Per-request facts filters may use
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterContext<'a> {
    pub principal: Option<&'a Principal>,
    pub client_ip: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub enum GatewayFilter {
    TokenRelay,
    StripPrefix(usize),
    AddRequestHeader(HeaderName, HeaderValue),
    RemoveRequestHeader(HeaderName),
    AddResponseHeader(HeaderName, HeaderValue),
    RequestRateLimiter(CallerRateLimiter),
}

impl GatewayFilter {
    fn compile(definition: &FilterDefinition) -> shared::Result<Self> {
        Ok(match definition {
            FilterDefinition::TokenRelay => GatewayFilter::TokenRelay,
            FilterDefinition::StripPrefix { parts } => GatewayFilter::StripPrefix(*parts),
            FilterDefinition::AddRequestHeader { name, value } => {
                GatewayFilter::AddRequestHeader(header_name(name)?, header_value(value)?)
            }
            FilterDefinition::RemoveRequestHeader { name } => {
                GatewayFilter::RemoveRequestHeader(header_name(name)?)
            }
            FilterDefinition::AddResponseHeader { name, value } => {
                GatewayFilter::AddResponseHeader(header_name(name)?, header_value(value)?)
            }
            FilterDefinition::RequestRateLimiter {
                replenish_per_second,
                burst,
            } => GatewayFilter::RequestRateLimiter(CallerRateLimiter::new(
                *replenish_per_second,
                *burst,
            )?),
        })
    }
}

fn header_name(name: &str) -> shared::Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| shared::Error::config(format!("Invalid header name '{}'", name)))
}

fn header_value(value: &str) -> shared::Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| shared::Error::config(format!("Invalid header value '{}'", value)))
}

/// Compiled filters of one route
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<GatewayFilter>,
}

impl FilterChain {
    pub fn compile(definitions: &[FilterDefinition]) -> shared::Result<Self> {
        let filters = definitions
            .iter()
            .map(GatewayFilter::compile)
            .collect::<shared::Result<Vec<_>>>()?;
        Ok(Self { filters })
    }

    pub fn apply_request(
        &self,
        request: &mut ProxyRequest,
        ctx: &FilterContext<'_>,
    ) -> Result<(), GatewayError> {
        for filter in &self.filters {
            match filter {
                GatewayFilter::TokenRelay => match ctx.principal {
                    Some(principal) => {
                        let value = HeaderValue::from_str(&format!("Bearer {}", principal.token))
                            .map_err(|_| {
                                GatewayError::InvalidToken("Token is not a valid header".into())
                            })?;
                        request.headers.insert(header::AUTHORIZATION, value);
                    }
                    None => {
                        request.headers.remove(header::AUTHORIZATION);
                    }
                },
                GatewayFilter::StripPrefix(parts) => {
                    request.path = strip_prefix(&request.path, *parts);
                }
                GatewayFilter::AddRequestHeader(name, value) => {
                    request.headers.append(name.clone(), value.clone());
                }
                GatewayFilter::RemoveRequestHeader(name) => {
                    request.headers.remove(name);
                }
                GatewayFilter::RequestRateLimiter(limiter) => {
                    let key = caller_key(
                        ctx.principal.map(|p| p.subject.as_str()),
                        ctx.client_ip,
                    );
                    limiter.check(&key).map_err(|e| GatewayError::RateLimited {
                        retry_after_secs: e.retry_after_secs,
                    })?;
                }
                GatewayFilter::AddResponseHeader(..) => {}
            }
        }
        Ok(())
    }

    pub fn apply_response(&self, headers: &mut HeaderMap) {
        for filter in &self.filters {
            if let GatewayFilter::AddResponseHeader(name, value) = filter {
                headers.append(name.clone(), value.clone());
            }
        }
    }
}

/// Drop the first `parts` path segments; the result is at least `/`
pub fn strip_prefix(path: &str, parts: usize) -> String {
    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let rest: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(parts)
        .collect();

    if rest.is_empty() {
        return "/".to_string();
    }

    let mut stripped = format!("/{}", rest.join("/"));
    if trailing_slash {
        stripped.push('/');
    }
    stripped
}
