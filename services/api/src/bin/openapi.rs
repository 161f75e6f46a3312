//! services/api/src/bin/openapi.rs
//!
//! Dumps the invoice API contract (upload, extract, review, delete and the
//! provider listing) as pretty-printed OpenAPI JSON, so clients can be
//! generated without starting the server or touching a database.
//!
//! Usage: `openapi [OUTPUT]`; the output defaults to `openapi.json`.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn write_contract(output: &str) -> Result<(), Box<dyn std::error::Error>> {
    let document = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(output, document)?;
    println!("Invoice API contract written to {}", output);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    write_contract(&output)
}
