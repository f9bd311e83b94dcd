//! OpenAPI Schema Export Binary
//!
//! Prints the gateway's OpenAPI document as JSON to stdout.
//!
//! Usage:
//!   cargo run -p api-gateway --bin export-openapi > openapi.json

use anyhow::Context;
use api_gateway::openapi::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let openapi_json = ApiDoc::openapi()
        .to_pretty_json()
        .context("Failed to serialize OpenAPI spec to JSON")?;

    println!("{}", openapi_json);
    Ok(())
}
