//! services/api/tests/http.rs
//!
//! Drives the full axum router over in-memory stores and a scripted backend.

use api_lib::adapters::PdfTextAdapter;
use api_lib::config::Config;
use api_lib::web::{build_router, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use invoice_extraction_core::domain::MediaType;
use invoice_extraction_core::memory::{InMemoryDocumentStore, InMemoryRecordStore};
use invoice_extraction_core::orchestrator::ExtractionOrchestrator;
use invoice_extraction_core::ports::{ExtractionProvider, PortResult, ProviderReply};
use invoice_extraction_core::provider::{InferenceBackend, PromptedProvider, ProviderRegistry};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "invoice-test-boundary";

const GOOD_REPLY: &str = r#"Sure, here is the data:
{"supplierName": "Acme Corp", "invoiceNumber": "INV-7", "invoiceDate": "2024-03-01",
 "dueDate": null, "currency": null, "subtotal": 100, "taxAmount": 10, "total": 110,
 "confidence": 0.9,
 "lineItems": [{"description": "Widget", "quantity": 2, "unitPrice": 50, "lineTotal": 100}]}"#;

//=========================================================================================
// Test Harness
//=========================================================================================

/// Replies to every call with the same text.
struct FixedBackend(String);

#[async_trait]
impl InferenceBackend for FixedBackend {
    async fn complete_vision(
        &self,
        _prompt: &str,
        _media_type: MediaType,
        _base64_data: &str,
    ) -> PortResult<ProviderReply> {
        self.complete_text("").await
    }

    async fn complete_text(&self, _prompt: &str) -> PortResult<ProviderReply> {
        Ok(ProviderReply {
            text: self.0.clone(),
            raw: json!({ "reply": self.0 }),
        })
    }
}

struct TestApp {
    router: Router,
    orchestrator: Arc<ExtractionOrchestrator>,
    records: Arc<InMemoryRecordStore>,
    _upload_dir: TempDir,
}

fn app(reply: &'static str) -> TestApp {
    let upload_dir = tempfile::tempdir().unwrap();
    let vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://unused/invoices".to_string()),
        ("UPLOAD_DIR", upload_dir.path().display().to_string()),
        ("MAX_FILE_SIZE_MB", "1".to_string()),
        ("LLM_PROVIDER", "scripted".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let config = Arc::new(Config::from_vars(&vars).unwrap());

    let registry = ProviderRegistry::new("scripted").register("scripted", move || {
        let provider: Arc<dyn ExtractionProvider> = Arc::new(PromptedProvider::new(
            "scripted",
            FixedBackend(reply.to_string()),
            Arc::new(PdfTextAdapter::new()),
        ));
        Ok(provider)
    });

    let records = Arc::new(InMemoryRecordStore::new());
    let orchestrator = Arc::new(ExtractionOrchestrator::new(
        records.clone(),
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(registry),
    ));
    let state = Arc::new(AppState::new(orchestrator.clone(), config));

    TestApp {
        router: build_router(state),
        orchestrator,
        records,
        _upload_dir: upload_dir,
    }
}

fn multipart(file_name: &str, content_type: &str, bytes: &[u8]) -> Body {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn upload_request(uri: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(multipart(file_name, content_type, bytes))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn uploaded_id(app: &TestApp) -> uuid::Uuid {
    app.orchestrator
        .create(b"\x89PNG fake image", "invoice.png", MediaType::Png)
        .await
        .unwrap()
        .id
}

//=========================================================================================
// Upload
//=========================================================================================

#[tokio::test]
async fn upload_creates_an_uploaded_record() {
    let app = app(GOOD_REPLY);

    let (status, body) = send(
        &app,
        upload_request("/api/invoices/upload", "March.PNG", "image/png", b"\x89PNG bytes"),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "UPLOADED");
    assert_eq!(body["data"]["fileName"], "March.PNG");
    assert_eq!(body["data"]["fileType"], "image/png");
    assert_eq!(body["data"]["fileSize"], 10);
    assert!(body["data"]["supplierName"].is_null());
    assert_eq!(app.records.len(), 1);
}

#[tokio::test]
async fn mismatched_extension_creates_no_record() {
    let app = app(GOOD_REPLY);

    let (status, body) = send(
        &app,
        upload_request("/api/invoices/upload", "invoice.pdf", "image/png", b"\x89PNG bytes"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "FileUploadError");
    assert!(app.records.is_empty());
}

#[tokio::test]
async fn oversized_and_unsupported_uploads_create_no_record() {
    let app = app(GOOD_REPLY);

    let too_big = vec![0u8; 1024 * 1024 + 1];
    let (status, body) = send(
        &app,
        upload_request("/api/invoices/upload", "scan.png", "image/png", &too_big),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Maximum size is 1MB"));

    let (status, _) = send(
        &app,
        upload_request("/api/invoices/upload", "notes.txt", "text/plain", b"hello"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.records.is_empty());
}

//=========================================================================================
// Extraction
//=========================================================================================

#[tokio::test]
async fn upload_and_extract_returns_the_extracted_record() {
    let app = app(GOOD_REPLY);

    let (status, body) = send(
        &app,
        upload_request("/api/invoices/upload-and-extract", "invoice.jpg", "image/jpeg", b"jpeg bytes"),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let data = &body["data"];
    assert_eq!(data["status"], "EXTRACTED");
    assert_eq!(data["supplierName"], "Acme Corp");
    assert_eq!(data["currency"], "USD");
    assert_eq!(data["confidence"], 0.9);
    assert_eq!(data["llmProvider"], "scripted");
    assert_eq!(data["lineItems"][0]["unitPrice"], 50.0);
    assert!(data["rawLlmJson"].is_object());
}

#[tokio::test]
async fn prose_reply_is_a_bad_gateway_and_leaves_the_record_in_error() {
    let app = app("Sorry, I could not read that document.");

    let (status, body) = send(
        &app,
        upload_request("/api/invoices/upload-and-extract", "invoice.png", "image/png", b"png bytes"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "ParseError");

    let (_, list) = send(&app, empty_request("GET", "/api/invoices")).await;
    assert_eq!(list["pagination"]["total"], 1);
    assert_eq!(list["data"][0]["status"], "ERROR");
    assert!(list["data"][0]["rawLlmJson"].is_null());
}

#[tokio::test]
async fn unknown_provider_is_a_bad_request_and_flips_the_record_to_error() {
    let app = app(GOOD_REPLY);
    let id = uploaded_id(&app).await;

    let (status, body) = send(
        &app,
        empty_request("POST", &format!("/api/invoices/{id}/extract?provider=nobody")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ProviderConfigurationError");

    let (_, body) = send(&app, empty_request("GET", &format!("/api/invoices/{id}"))).await;
    assert_eq!(body["data"]["status"], "ERROR");

    let (status, body) = send(
        &app,
        empty_request("POST", &format!("/api/invoices/{id}/extract")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "EXTRACTED");
}

#[tokio::test]
async fn extracting_a_missing_invoice_is_not_found() {
    let app = app(GOOD_REPLY);

    let (status, body) = send(
        &app,
        empty_request("POST", &format!("/api/invoices/{}/extract", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

//=========================================================================================
// Listing
//=========================================================================================

#[tokio::test]
async fn lists_newest_first_with_pagination() {
    let app = app(GOOD_REPLY);
    for _ in 0..15 {
        uploaded_id(&app).await;
    }

    let (status, body) = send(&app, empty_request("GET", "/api/invoices?page=2&limit=10")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(
        body["pagination"],
        json!({ "page": 2, "limit": 10, "total": 15, "totalPages": 2 })
    );

    let (_, body) = send(&app, empty_request("GET", "/api/invoices")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 10);
    assert_eq!(body["pagination"]["page"], 1);
}

#[tokio::test]
async fn invalid_pagination_is_a_validation_error() {
    let app = app(GOOD_REPLY);

    for uri in ["/api/invoices?limit=0", "/api/invoices?page=0", "/api/invoices?limit=101", "/api/invoices?page=abc"] {
        let (status, body) = send(&app, empty_request("GET", uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["kind"], "ValidationError", "{uri}");
    }
}

//=========================================================================================
// Review
//=========================================================================================

#[tokio::test]
async fn update_distinguishes_null_from_absent() {
    let app = app(GOOD_REPLY);
    let id = uploaded_id(&app).await;
    app.orchestrator.extract(id, None).await.unwrap();

    let (status, body) = send(
        &app,
        json_request("PUT", &format!("/api/invoices/{id}"), r#"{"supplierName": null, "total": 99.5}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert!(data["supplierName"].is_null());
    assert_eq!(data["invoiceNumber"], "INV-7");
    assert_eq!(data["total"], 99.5);
    assert_eq!(data["status"], "SAVED");
    assert_eq!(data["lineItems"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn update_replaces_line_items_and_accepts_a_status() {
    let app = app(GOOD_REPLY);
    let id = uploaded_id(&app).await;
    app.orchestrator.extract(id, None).await.unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/invoices/{id}"),
            r#"{"status": "NEEDS_REVIEW", "lineItems": [
                {"description": "Bolt", "quantity": 4, "unitPrice": 1.25, "lineTotal": 5},
                {"description": "Nut", "quantity": 4, "unitPrice": 0.5, "lineTotal": 2}
            ]}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "NEEDS_REVIEW");
    let items = body["data"]["lineItems"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["description"], "Bolt");
}

#[tokio::test]
async fn invalid_updates_are_rejected_with_details() {
    let app = app(GOOD_REPLY);
    let id = uploaded_id(&app).await;
    let uri = format!("/api/invoices/{id}");

    let (status, body) = send(&app, json_request("PUT", &uri, r#"{"currency": null}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "currency");

    let (status, body) = send(&app, json_request("PUT", &uri, r#"{"status": "PROCESSING"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "status");

    let (status, body) = send(&app, json_request("PUT", &uri, "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    let (_, body) = send(&app, empty_request("GET", &uri)).await;
    assert_eq!(body["data"]["status"], "UPLOADED");
}

//=========================================================================================
// Deletion and Service Endpoints
//=========================================================================================

#[tokio::test]
async fn delete_removes_the_record_and_unknown_ids_are_not_found() {
    let app = app(GOOD_REPLY);
    let id = uploaded_id(&app).await;

    let (status, body) = send(&app, empty_request("DELETE", &format!("/api/invoices/{}", uuid::Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
    assert_eq!(app.records.len(), 1);

    let (status, body) = send(&app, empty_request("DELETE", "/api/invoices/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    let (status, body) = send(&app, empty_request("DELETE", &format!("/api/invoices/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(app.records.is_empty());

    let (status, _) = send(&app, empty_request("GET", &format!("/api/invoices/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_providers_report_the_service() {
    let app = app(GOOD_REPLY);

    let (status, body) = send(&app, empty_request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, empty_request("GET", "/api/providers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "providers": ["scripted"], "default": "scripted" }));
}

#[tokio::test]
async fn api_contract_documents_every_invoice_route() {
    let app = app(GOOD_REPLY);

    let (status, body) = send(&app, empty_request("GET", "/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    for path in [
        "/api/invoices",
        "/api/invoices/upload",
        "/api/invoices/upload-and-extract",
        "/api/invoices/{id}",
        "/api/invoices/{id}/extract",
        "/api/providers",
        "/health",
    ] {
        assert!(paths.contains_key(path), "missing {}", path);
    }
    assert!(body["paths"]["/api/invoices/{id}"]["put"].is_object());
}
