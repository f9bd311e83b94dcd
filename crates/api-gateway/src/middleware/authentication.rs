//! Gateway Security Middleware
//!
//! Authenticates the bearer token (if any) and enforces the path access
//! rules before a request reaches a handler or the proxy.
//!
//! # Flow
//!
//! 1. The path is canonicalized; a `..` segment or a malformed escape is
//!    rejected with 400. The [`CanonicalPath`] goes into request extensions
//!    so the proxy routes and forwards exactly what was authorized.
//! 2. A bearer token present on the request is verified. A token that fails
//!    verification is rejected with 401 even on public paths.
//! 3. The verified [`Principal`] is stored in request extensions.
//! 4. The first matching access rule decides: permit, 401 (no token) or
//!    403 (missing role).

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::router::{canonical_path, CanonicalPath};
use crate::security::{bearer_token, AccessDecision, AccessRules, Principal};
use crate::services::TokenVerifier;

/// Security middleware factory
#[derive(Clone)]
pub struct GatewaySecurity {
    verifier: Arc<TokenVerifier>,
    rules: Arc<AccessRules>,
}

impl GatewaySecurity {
    pub fn new(verifier: Arc<TokenVerifier>, rules: Arc<AccessRules>) -> Self {
        Self { verifier, rules }
    }
}

impl<S, B> Transform<S, ServiceRequest> for GatewaySecurity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = GatewaySecurityMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(GatewaySecurityMiddleware {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
            rules: self.rules.clone(),
        }))
    }
}

pub struct GatewaySecurityMiddleware<S> {
    service: Rc<S>,
    verifier: Arc<TokenVerifier>,
    rules: Arc<AccessRules>,
}

impl<S, B> Service<ServiceRequest> for GatewaySecurityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let verifier = self.verifier.clone();
        let rules = self.rules.clone();

        Box::pin(async move {
            let path = match canonical_path(req.path()) {
                Ok(path) => path,
                Err(err) => {
                    warn!(path = %req.path(), error = %err, "Rejected request path");
                    return Ok(reject(req, err));
                }
            };

            let token = bearer_token(req.headers()).map(str::to_string);

            let principal: Option<Principal> = match token {
                Some(token) => match verifier.verify(&token).await {
                    Ok(principal) => Some(principal),
                    Err(err) => {
                        warn!(path = %path, error = %err, "Rejected bearer token");
                        return Ok(reject(req, err));
                    }
                },
                None => None,
            };

            let decision = rules.decide(&path, principal.as_ref());
            debug!(
                path = %path,
                subject = ?principal.as_ref().map(|p| p.subject.as_str()),
                decision = ?decision,
                "Access decision"
            );

            match decision {
                AccessDecision::Permit => {
                    req.extensions_mut().insert(CanonicalPath(path));
                    if let Some(principal) = principal {
                        req.extensions_mut().insert(principal);
                    }
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                AccessDecision::Unauthenticated => Ok(reject(req, GatewayError::MissingToken)),
                AccessDecision::Forbidden => Ok(reject(
                    req,
                    GatewayError::Forbidden("Access Denied".to_string()),
                )),
            }
        })
    }
}

fn reject<B>(req: ServiceRequest, err: GatewayError) -> ServiceResponse<EitherBody<B>> {
    req.into_response(err.error_response())
        .map_into_right_body()
}
