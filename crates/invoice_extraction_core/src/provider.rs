//! crates/invoice_extraction_core/src/provider.rs
//!
//! The extraction strategy shared by every vendor, and the registry that
//! selects a provider by name.
//!
//! Vendors only implement `InferenceBackend` (one text call, one vision call).
//! `PromptedProvider` decides which path a document takes: images are base64
//! encoded and sent with the vision prompt, PDFs are converted to text first
//! and sent with the text prompt.

use crate::domain::MediaType;
use crate::ports::{ExtractionProvider, PortError, PortResult, ProviderReply, TextExtractor};
use crate::prompts;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Below this many non-whitespace characters a PDF is treated as image-only.
pub const MIN_TEXT_CHARS: usize = 10;

//=========================================================================================
// Inference Backend Port
//=========================================================================================

/// A vendor transport for completion calls.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Sends a prompt together with one base64-encoded image.
    async fn complete_vision(
        &self,
        prompt: &str,
        media_type: MediaType,
        base64_data: &str,
    ) -> PortResult<ProviderReply>;

    /// Sends a text-only prompt.
    async fn complete_text(&self, prompt: &str) -> PortResult<ProviderReply>;
}

//=========================================================================================
// The Shared Strategy
//=========================================================================================

/// An `ExtractionProvider` that routes documents to a backend by media type.
pub struct PromptedProvider<B> {
    name: String,
    backend: B,
    text_extractor: Arc<dyn TextExtractor>,
}

impl<B: InferenceBackend> PromptedProvider<B> {
    pub fn new(name: impl Into<String>, backend: B, text_extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            name: name.into(),
            backend,
            text_extractor,
        }
    }

    async fn extract_from_text(&self, bytes: &[u8]) -> PortResult<ProviderReply> {
        let text = self.text_extractor.extract_text(bytes).await.map_err(|e| {
            PortError::Extraction(format!(
                "Failed to read text from the PDF ({}). Try uploading it as JPG/PNG instead.",
                e
            ))
        })?;

        let usable = text.chars().filter(|c| !c.is_whitespace()).count();
        if usable < MIN_TEXT_CHARS {
            return Err(PortError::Extraction(
                "PDF appears to be empty or contains only images. Please upload it as JPG/PNG instead."
                    .to_string(),
            ));
        }

        debug!(provider = %self.name, chars = usable, "Sending extracted PDF text for completion");
        self.backend.complete_text(&prompts::text_prompt(&text)).await
    }

    async fn extract_from_image(&self, bytes: &[u8], media_type: MediaType) -> PortResult<ProviderReply> {
        let encoded = STANDARD.encode(bytes);
        debug!(provider = %self.name, %media_type, "Sending image for vision completion");
        self.backend
            .complete_vision(&prompts::vision_prompt(), media_type, &encoded)
            .await
    }
}

#[async_trait]
impl<B: InferenceBackend> ExtractionProvider for PromptedProvider<B> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, bytes: &[u8], media_type: MediaType) -> PortResult<ProviderReply> {
        let reply = if media_type.is_image() {
            self.extract_from_image(bytes, media_type).await?
        } else {
            self.extract_from_text(bytes).await?
        };

        if reply.text.trim().is_empty() {
            return Err(PortError::Extraction(format!(
                "No response content from {}",
                self.name
            )));
        }
        Ok(reply)
    }
}

//=========================================================================================
// Provider Registry
//=========================================================================================

type ProviderConstructor = Box<dyn Fn() -> PortResult<Arc<dyn ExtractionProvider>> + Send + Sync>;

/// Maps provider names to constructors.
///
/// Constructors run on every `resolve`, so each provider checks its own
/// credentials only when it is selected.
pub struct ProviderRegistry {
    default_provider: String,
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            default_provider: default_provider.into(),
            constructors: BTreeMap::new(),
        }
    }

    /// Registers a constructor under `name`, replacing any previous one.
    pub fn register<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> PortResult<Arc<dyn ExtractionProvider>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
        self
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Builds the named provider, or the default one when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> PortResult<Arc<dyn ExtractionProvider>> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.default_provider.as_str());
        let constructor = self.constructors.get(name).ok_or_else(|| {
            PortError::ProviderConfiguration(format!(
                "Unknown LLM provider '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))
        })?;
        let provider = constructor()?;
        info!(provider = %name, "Resolved extraction provider");
        Ok(provider)
    }
}
