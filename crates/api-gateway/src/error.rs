//! Gateway error responses
//!
//! Every failure the gateway produces on its own (as opposed to responses
//! relayed from an upstream) is rendered as `{"error": code, "message": text}`.

use actix_web::{
    http::{header, StatusCode},
    HttpResponse, ResponseError,
};

use crate::models::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Full authentication is required to access this resource")]
    MissingToken,

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("No route matches {0}")]
    RouteNotFound(String),

    #[error("Rate limit exceeded. Try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Service {0} is temporarily unavailable")]
    ServiceUnavailable(String),

    #[error("Upstream {route} failed: {message}")]
    BadGateway { route: String, message: String },

    #[error("Upstream {0} did not respond in time")]
    GatewayTimeout(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// Machine-readable error code used in the JSON body
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MissingToken => "unauthorized",
            GatewayError::InvalidToken(_) => "invalid_token",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::RouteNotFound(_) => "not_found",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::ServiceUnavailable(_) => "service_unavailable",
            GatewayError::BadGateway { .. } => "bad_gateway",
            GatewayError::GatewayTimeout(_) => "gateway_timeout",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingToken | GatewayError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        match self {
            GatewayError::MissingToken => {
                builder.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
            }
            GatewayError::InvalidToken(_) => {
                builder.insert_header((
                    header::WWW_AUTHENTICATE,
                    r#"Bearer error="invalid_token""#,
                ));
            }
            GatewayError::Forbidden(_) => {
                builder.insert_header((
                    header::WWW_AUTHENTICATE,
                    r#"Bearer error="insufficient_scope""#,
                ));
            }
            GatewayError::RateLimited { retry_after_secs } => {
                builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
            }
            _ => {}
        }

        builder.json(ErrorResponse::new(self.code(), self.to_string()))
    }
}

impl From<shared::Error> for GatewayError {
    fn from(err: shared::Error) -> Self {
        match err {
            shared::Error::Authentication(msg) => GatewayError::InvalidToken(msg),
            shared::Error::Validation(msg) => GatewayError::BadRequest(msg),
            shared::Error::NotFound { id, .. } => GatewayError::RouteNotFound(id),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}
