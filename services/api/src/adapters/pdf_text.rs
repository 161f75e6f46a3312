//! services/api/src/adapters/pdf_text.rs
//!
//! Reads the embedded text layer of a PDF with the `pdf-extract` crate.

use async_trait::async_trait;
use invoice_extraction_core::ports::{PortError, PortResult, TextExtractor};
use tracing::debug;

/// A `TextExtractor` for digital PDFs. Scanned PDFs yield little or no text.
#[derive(Clone, Default)]
pub struct PdfTextAdapter;

impl PdfTextAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PdfTextAdapter {
    async fn extract_text(&self, bytes: &[u8]) -> PortResult<String> {
        let owned = bytes.to_vec();
        // The parser is CPU bound and panics on some malformed input; a panic
        // surfaces here as a JoinError instead of taking down the worker.
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&owned)
        })
        .await
        .map_err(|e| PortError::Extraction(format!("PDF parser aborted: {}", e)))?
        .map_err(|e| PortError::Extraction(e.to_string()))?;

        debug!(pages = pages.len(), "Extracted PDF text layer");
        Ok(pages.join("\n"))
    }
}
