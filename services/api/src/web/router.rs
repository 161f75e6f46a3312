//! services/api/src/web/router.rs
//!
//! Assembles the axum `Router`: the invoice API, uploaded files, Swagger UI and CORS.

use crate::web::rest::{
    delete_invoice_handler, extract_invoice_handler, get_invoice_handler, health_handler,
    list_invoices_handler, providers_handler, update_invoice_handler, upload_and_extract_handler,
    upload_invoice_handler, ApiDoc,
};
use crate::web::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the complete application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let config = state.config.clone();
    let body_limit = usize::try_from(state.upload_policy.max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let invoice_routes = Router::new()
        .route("/", get(list_invoices_handler))
        .route("/upload", post(upload_invoice_handler))
        .route("/upload-and-extract", post(upload_and_extract_handler))
        .route(
            "/{id}",
            get(get_invoice_handler)
                .put(update_invoice_handler)
                .delete(delete_invoice_handler),
        )
        .route("/{id}/extract", post(extract_invoice_handler));

    let api_router = Router::new()
        .nest("/api/invoices", invoice_routes)
        .route("/api/providers", get(providers_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    // Merge the API router with the file server and the Swagger UI router.
    Router::new()
        .merge(api_router)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(&config.cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}
