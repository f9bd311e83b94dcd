//! Request ID Middleware
//!
//! Gives every request passing through the gateway a correlation id. The id
//! is echoed on the response and forwarded to the upstream service as
//! `X-Request-ID`, so gateway and backend logs can be joined.
//!
//! # Behavior
//!
//! - A well-formed `X-Request-ID` from the caller is kept
//! - Missing or malformed ids are replaced with a UUID v4
//! - The id is stored in request extensions ([`RequestIdExt`])

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
};
use tracing::{debug, Span};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id accepted as is
const MAX_REQUEST_ID_LEN: usize = 128;

/// Request ID stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdExt(pub String);

/// Request id assigned by [`RequestId`], if the middleware ran
pub fn request_id(req: &HttpRequest) -> Option<String> {
    req.extensions().get::<RequestIdExt>().map(|r| r.0.clone())
}

fn is_acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
}

/// Request ID middleware
pub struct RequestId;

impl RequestId {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestId
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestIdMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestIdMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestIdMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let supplied = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|h| h.to_str().ok())
                .filter(|id| is_acceptable(id))
                .map(str::to_string);

            let request_id = match supplied {
                Some(id) => id,
                None => Uuid::new_v4().to_string(),
            };

            req.extensions_mut()
                .insert(RequestIdExt(request_id.clone()));

            Span::current().record("request_id", &request_id);
            debug!(request_id = %request_id, path = %req.path(), "Processing request");

            let mut res = service.call(req).await?;

            if let Ok(value) = HeaderValue::try_from(&request_id) {
                res.headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }

            Ok(res)
        })
    }
}
