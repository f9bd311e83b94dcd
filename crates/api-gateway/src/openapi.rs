//! OpenAPI Documentation Configuration
//!
//! Documents the gateway's own endpoints. Backend APIs publish their own
//! documents, reachable through the gateway under `/api/<service>/v3/api-docs`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers;
use crate::models;

/// OpenAPI documentation for the Wellness Hub gateway
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Wellness Hub API Gateway",
        version = "1.0.0",
        description = "Single entry point for the campus wellness services.\n\n## Routing\n\n- `/api/goals/**` → goal-tracking-service (role `student`)\n- `/api/events/**` → event-service (roles `student` or `staff`; registration is `student` only)\n- `/api/resources/**` → wellness-resource-service (role `staff`)\n\n## Authentication\n\nSend the identity provider's access token as `Authorization: Bearer <token>`. The gateway relays it to the backend service.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development server")
    ),
    tags(
        (name = "Actuator", description = "Health, info and metrics endpoints")
    ),
    modifiers(&SecurityAddon),
    paths(
        handlers::health,
        handlers::info,
        handlers::prometheus,
    ),
    components(
        schemas(
            models::ErrorResponse,
            handlers::HealthResponse,
            handlers::ComponentHealth,
            handlers::InfoResponse,
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some(
                        "Access token issued by the wellness-hub realm of the identity provider.",
                    ))
                    .build(),
            ),
        );
    }
}
