//! Upstream dispatch
//!
//! The catch-all handler: picks the route for the canonical path, runs its
//! filters, asks the route's circuit breaker for admission, forwards the
//! request with the shared client and streams the upstream response back.
//!
//! # Failure mapping
//!
//! | Condition                        | Response |
//! |----------------------------------|----------|
//! | no route matches                 | 404      |
//! | circuit breaker open             | 503      |
//! | connect / protocol error         | 502      |
//! | upstream timeout                 | 504      |
//!
//! Transport errors and upstream 5xx responses count as breaker failures.

use actix_web::{
    body::SizedStream,
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        Method, StatusCode,
    },
    web, HttpMessage, HttpRequest, HttpResponse,
};
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::filters::{FilterContext, ProxyRequest};
use crate::middleware::request_id;
use crate::router::{canonical_path, CanonicalPath, Route};
use crate::security::Principal;
use crate::state::GatewayState;

/// Connection-scoped headers never forwarded in either direction
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<GatewayState>,
) -> Result<HttpResponse, GatewayError> {
    let path = match req.extensions().get::<CanonicalPath>() {
        Some(CanonicalPath(path)) => path.clone(),
        None => canonical_path(req.path())?,
    };

    let route = state
        .router
        .route(req.method(), &path, req.headers())
        .ok_or_else(|| GatewayError::RouteNotFound(path.clone()))?;

    let principal = req.extensions().get::<Principal>().cloned();
    let client_ip = req.connection_info().peer_addr().map(str::to_string);

    let mut proxy_req = ProxyRequest {
        method: req.method().clone(),
        path,
        query: Some(req.query_string().to_string()).filter(|q| !q.is_empty()),
        headers: outbound_headers(&req, client_ip.as_deref()),
        body,
    };

    route.filters.apply_request(
        &mut proxy_req,
        &FilterContext {
            principal: principal.as_ref(),
            client_ip: client_ip.as_deref(),
        },
    )?;

    // actix and reqwest carry different `http` crate versions
    let method =
        reqwest::Method::from_bytes(proxy_req.method.as_str().as_bytes()).map_err(|_| {
            GatewayError::BadRequest(format!("Unsupported method {}", proxy_req.method))
        })?;

    // Admission comes last: a request rejected above never holds a trial slot
    let permit = match state.breaker(&route.id) {
        Some(breaker) => match breaker.try_acquire().await {
            Some(permit) => Some(permit),
            None => {
                record_outcome(&route.id, "short_circuited");
                return Err(GatewayError::ServiceUnavailable(route.id.clone()));
            }
        },
        None => None,
    };

    let url = upstream_url(route, &proxy_req);
    debug!(route_id = %route.id, method = %proxy_req.method, url = %url, "Forwarding request");

    let started = Instant::now();
    let result = send(&state.client, method, &url, &proxy_req).await;
    histogram!("gateway_upstream_duration_seconds", "route" => route.id.clone())
        .record(started.elapsed().as_secs_f64());

    let upstream = match result {
        Ok(upstream) => upstream,
        Err(err) => {
            if let Some(permit) = permit {
                permit.failure().await;
            }
            let outcome = if err.is_timeout() { "timeout" } else { "error" };
            record_outcome(&route.id, outcome);
            warn!(route_id = %route.id, url = %url, error = %err, "Upstream request failed");

            return Err(if err.is_timeout() {
                GatewayError::GatewayTimeout(route.id.clone())
            } else {
                GatewayError::BadGateway {
                    route: route.id.clone(),
                    message: err.to_string(),
                }
            });
        }
    };

    let status = upstream.status().as_u16();
    if let Some(permit) = permit {
        if status >= 500 {
            permit.failure().await;
        } else {
            permit.success().await;
        }
    }
    record_outcome(&route.id, if status >= 500 { "upstream_5xx" } else { "ok" });

    relay_response(route, &proxy_req.method, upstream)
}

async fn send(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    proxy_req: &ProxyRequest,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut headers = reqwest::header::HeaderMap::with_capacity(proxy_req.headers.len());
    for (name, value) in proxy_req.headers.iter() {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    client
        .request(method, url)
        .headers(headers)
        .body(proxy_req.body.clone())
        .send()
        .await
}

fn relay_response(
    route: &Route,
    method: &Method,
    upstream: reqwest::Response,
) -> Result<HttpResponse, GatewayError> {
    let status = StatusCode::from_u16(upstream.status().as_u16()).map_err(|_| {
        GatewayError::BadGateway {
            route: route.id.clone(),
            message: format!("invalid status {}", upstream.status()),
        }
    })?;

    let mut headers = HeaderMap::new();
    let dropped = connection_listed(
        upstream
            .headers()
            .get_all("connection")
            .iter()
            .filter_map(|v| v.to_str().ok()),
    );
    for (name, value) in upstream.headers() {
        let name = name.as_str();
        if is_hop_by_hop(name) || name == "content-length" || dropped.iter().any(|d| d == name)
        {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    route.filters.apply_response(&mut headers);

    let mut builder = HttpResponse::build(status);
    for (name, value) in headers.iter() {
        builder.append_header((name.clone(), value.clone()));
    }

    let bodyless = *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;
    if bodyless {
        return Ok(builder.finish());
    }

    let length = upstream.content_length();
    let stream = upstream.bytes_stream();
    Ok(match length {
        Some(length) => builder.body(SizedStream::new(length, stream)),
        None => builder.streaming(stream),
    })
}

/// Client request headers as they leave the gateway
fn outbound_headers(req: &HttpRequest, client_ip: Option<&str>) -> HeaderMap {
    let dropped = connection_listed(
        req.headers()
            .get_all(header::CONNECTION)
            .filter_map(|v| v.to_str().ok()),
    );

    let mut headers = HeaderMap::new();
    for (name, value) in req.headers().iter() {
        let lower = name.as_str();
        if is_hop_by_hop(lower)
            || lower == "host"
            || lower == "content-length"
            || dropped.iter().any(|d| d == lower)
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let conn = req.connection_info();
    if let Some(ip) = client_ip {
        let forwarded_for = match req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => format!("{}, {}", existing, ip),
            None => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(HeaderName::from_static("x-forwarded-for"), value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(conn.scheme()) {
        headers.insert(HeaderName::from_static("x-forwarded-proto"), value);
    }
    if let Ok(value) = HeaderValue::from_str(conn.host()) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), value);
    }
    if let Some(id) = request_id(req) {
        if let Ok(value) = HeaderValue::from_str(&id) {
            headers.insert(HeaderName::from_static("x-request-id"), value);
        }
    }

    headers
}

fn upstream_url(route: &Route, proxy_req: &ProxyRequest) -> String {
    let mut url = format!("{}{}", route.base_uri, proxy_req.path);
    if let Some(query) = &proxy_req.query {
        url.push('?');
        url.push_str(query);
    }
    url
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Extra headers named in `Connection: a, b`
fn connection_listed<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

fn record_outcome(route_id: &str, outcome: &'static str) {
    counter!(
        "gateway_upstream_requests_total",
        "route" => route_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
