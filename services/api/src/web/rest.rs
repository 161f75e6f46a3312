//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ErrorBody, ErrorDetail, HttpError};
use crate::web::dto::{
    HealthResponse, InvoiceDto, InvoiceListResponse, InvoiceResponse, LineItemDto, ListQuery,
    MessageResponse, PaginationDto, ProviderQuery, ProvidersDto, ProvidersResponse,
    UpdateInvoiceRequest,
};
use crate::web::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use chrono::Utc;
use invoice_extraction_core::domain::{Invoice, MediaType};
use invoice_extraction_core::ports::PortError;
use invoice_extraction_core::upload::UploadPolicy;
use std::sync::Arc;
use utoipa::OpenApi;
use uuid::Uuid;

/// Name of the multipart part that carries the document.
pub const FILE_FIELD: &str = "file";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_invoice_handler,
        upload_and_extract_handler,
        extract_invoice_handler,
        get_invoice_handler,
        list_invoices_handler,
        update_invoice_handler,
        delete_invoice_handler,
        providers_handler,
        health_handler,
    ),
    components(
        schemas(
            InvoiceDto,
            LineItemDto,
            InvoiceResponse,
            InvoiceListResponse,
            PaginationDto,
            UpdateInvoiceRequest,
            MessageResponse,
            ProvidersResponse,
            ProvidersDto,
            HealthResponse,
            ErrorBody,
            ErrorDetail,
        )
    ),
    tags(
        (name = "Invoices", description = "Upload invoices, extract their fields with an LLM and review the results.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Request Helpers
//=========================================================================================

fn parse_id(raw: &str) -> Result<Uuid, HttpError> {
    Uuid::parse_str(raw)
        .map_err(|_| HttpError(PortError::invalid(format!("Invalid invoice id '{}'", raw))))
}

fn provider_name(query: &Result<Query<ProviderQuery>, QueryRejection>) -> Result<Option<&str>, HttpError> {
    match query {
        Ok(Query(q)) => Ok(q.provider.as_deref()),
        Err(rejection) => Err(HttpError(PortError::invalid(rejection.body_text()))),
    }
}

/// Reads the `file` part and checks it against the upload policy.
async fn read_upload(
    policy: &UploadPolicy,
    mut multipart: Multipart,
) -> Result<(String, MediaType, Bytes), HttpError> {
    let read_error = |e: axum::extract::multipart::MultipartError| {
        PortError::FileUpload(format!("Failed to read multipart data: {}", e.body_text()))
    };

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| PortError::FileUpload("The uploaded file has no file name".to_string()))?;
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(read_error)?;

        let media_type = policy.validate(&file_name, &content_type, data.len() as u64)?;
        return Ok((file_name, media_type, data));
    }

    Err(PortError::FileUpload("No file uploaded".to_string()).into())
}

async fn store_upload(state: &AppState, multipart: Multipart) -> Result<Invoice, HttpError> {
    let (file_name, media_type, data) = read_upload(&state.upload_policy, multipart).await?;
    Ok(state.orchestrator.create(&data, &file_name, media_type).await?)
}

//=========================================================================================
// Invoice Handlers
//=========================================================================================

/// Upload an invoice document.
///
/// Accepts a multipart/form-data request with a `file` part (PDF, JPG or PNG).
#[utoipa::path(
    post,
    path = "/api/invoices/upload",
    tag = "Invoices",
    request_body(content_type = "multipart/form-data", description = "The invoice file in a part named `file`."),
    responses(
        (status = 201, description = "Invoice uploaded", body = InvoiceResponse),
        (status = 400, description = "Missing, mistyped or oversized file", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn upload_invoice_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let invoice = store_upload(&state, multipart).await?;
    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse::new(&invoice, Some("Invoice uploaded successfully"))),
    ))
}

/// Upload an invoice document and extract it immediately.
///
/// If extraction fails the error is returned and the created record stays in `ERROR`.
#[utoipa::path(
    post,
    path = "/api/invoices/upload-and-extract",
    tag = "Invoices",
    params(ProviderQuery),
    request_body(content_type = "multipart/form-data", description = "The invoice file in a part named `file`."),
    responses(
        (status = 201, description = "Invoice uploaded and extracted", body = InvoiceResponse),
        (status = 400, description = "Invalid upload or provider configuration", body = ErrorBody),
        (status = 502, description = "The provider failed or replied with unusable data", body = ErrorBody)
    )
)]
pub async fn upload_and_extract_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProviderQuery>, QueryRejection>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let provider = provider_name(&query)?;
    let uploaded = store_upload(&state, multipart).await?;
    let invoice = state.orchestrator.extract(uploaded.id, provider).await?;
    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse::new(
            &invoice,
            Some("Invoice uploaded and extracted successfully"),
        )),
    ))
}

/// Run extraction on an existing invoice.
#[utoipa::path(
    post,
    path = "/api/invoices/{id}/extract",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice id"), ProviderQuery),
    responses(
        (status = 200, description = "Invoice extracted", body = InvoiceResponse),
        (status = 400, description = "Invalid id or provider configuration", body = ErrorBody),
        (status = 404, description = "Invoice not found", body = ErrorBody),
        (status = 502, description = "The provider failed or replied with unusable data", body = ErrorBody)
    )
)]
pub async fn extract_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<ProviderQuery>, QueryRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let id = parse_id(&id)?;
    let provider = provider_name(&query)?;
    let invoice = state.orchestrator.extract(id, provider).await?;
    Ok(Json(InvoiceResponse::new(
        &invoice,
        Some("Invoice extracted successfully"),
    )))
}

/// Get one invoice with its line items.
#[utoipa::path(
    get,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "The invoice", body = InvoiceResponse),
        (status = 404, description = "Invoice not found", body = ErrorBody)
    )
)]
pub async fn get_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let invoice = state.orchestrator.get(parse_id(&id)?).await?;
    Ok(Json(InvoiceResponse::new(&invoice, None)))
}

/// List invoices, newest first.
#[utoipa::path(
    get,
    path = "/api/invoices",
    tag = "Invoices",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of invoices", body = InvoiceListResponse),
        (status = 400, description = "Invalid pagination", body = ErrorBody)
    )
)]
pub async fn list_invoices_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Query(query) = query.map_err(|e| HttpError(PortError::invalid(e.body_text())))?;
    let page = state.orchestrator.list(query.page(), query.limit()).await?;
    Ok(Json(InvoiceListResponse::from(&page)))
}

/// Apply a reviewer's edits.
///
/// Fields that are absent stay unchanged, `null` clears a field, `lineItems`
/// replaces every line item. Status becomes `SAVED` unless one is given.
#[utoipa::path(
    put,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = UpdateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice updated", body = InvoiceResponse),
        (status = 400, description = "Invalid edit", body = ErrorBody),
        (status = 404, description = "Invoice not found", body = ErrorBody)
    )
)]
pub async fn update_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateInvoiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let id = parse_id(&id)?;
    let Json(request) = body.map_err(|e| HttpError(PortError::invalid(e.body_text())))?;
    let invoice = state.orchestrator.update(id, request.into_update()?).await?;
    Ok(Json(InvoiceResponse::new(
        &invoice,
        Some("Invoice updated successfully"),
    )))
}

/// Delete an invoice, its line items and its uploaded file.
#[utoipa::path(
    delete,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice deleted", body = MessageResponse),
        (status = 404, description = "Invoice not found", body = ErrorBody)
    )
)]
pub async fn delete_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    state.orchestrator.delete(parse_id(&id)?).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Invoice deleted successfully".to_string(),
    }))
}

//=========================================================================================
// Service Handlers
//=========================================================================================

/// List the registered extraction providers.
#[utoipa::path(
    get,
    path = "/api/providers",
    tag = "Invoices",
    responses((status = 200, description = "Registered providers", body = ProvidersResponse))
)]
pub async fn providers_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.orchestrator.providers();
    Json(ProvidersResponse {
        success: true,
        data: ProvidersDto {
            providers: registry.names(),
            default: registry.default_provider().to_string(),
        },
    })
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Invoices",
    responses((status = 200, description = "The service is up", body = HealthResponse))
)]
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}
