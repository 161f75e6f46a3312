//! services/api/src/adapters/gemini.rs
//!
//! This module contains the adapter for Google Gemini's `generateContent` API.
//! It implements the `InferenceBackend` port from the `core` crate over plain HTTP.

use async_trait::async_trait;
use invoice_extraction_core::domain::MediaType;
use invoice_extraction_core::ports::{PortError, PortResult, ProviderReply};
use invoice_extraction_core::provider::InferenceBackend;
use serde_json::{json, Value};
use tracing::debug;

/// The registry name of this backend.
pub const PROVIDER_NAME: &str = "gemini";

const TEMPERATURE: f64 = 0.1;

/// An `InferenceBackend` that calls the Gemini REST API.
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client, api_key: String, model: String, base_url: &str) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Creates a backend for `api_key`, failing when no key is configured.
    pub fn from_api_key(
        client: reqwest::Client,
        api_key: Option<&str>,
        model: &str,
        base_url: &str,
    ) -> PortResult<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            PortError::ProviderConfiguration("GEMINI_API_KEY is not configured".to_string())
        })?;
        Ok(Self::new(client, api_key.to_string(), model.to_string(), base_url))
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate(&self, parts: Vec<Value>) -> PortResult<ProviderReply> {
        let body = request_body(parts);
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // reqwest includes the URL in its message, and the URL carries the key.
                PortError::Extraction(format!("Gemini request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PortError::Extraction(format!(
                "Gemini returned {}: {}",
                status, detail
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| PortError::Extraction(format!("Gemini response was not JSON: {}", e.without_url())))?;
        let text = reply_text(&payload);
        debug!(model = %self.model, chars = text.len(), "Gemini completion received");

        Ok(ProviderReply {
            raw: json!({
                "text": text,
                "candidates": payload.get("candidates").cloned().unwrap_or(Value::Null),
            }),
            text,
        })
    }
}

fn request_body(parts: Vec<Value>) -> Value {
    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": { "temperature": TEMPERATURE },
    })
}

/// Concatenates the text parts of the first candidate.
fn reply_text(payload: &Value) -> String {
    payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    async fn complete_vision(
        &self,
        prompt: &str,
        media_type: MediaType,
        base64_data: &str,
    ) -> PortResult<ProviderReply> {
        self.generate(vec![
            json!({ "text": prompt }),
            json!({ "inline_data": { "mime_type": media_type.mime(), "data": base64_data } }),
        ])
        .await
    }

    async fn complete_text(&self, prompt: &str) -> PortResult<ProviderReply> {
        self.generate(vec![json!({ "text": prompt })]).await
    }
}
