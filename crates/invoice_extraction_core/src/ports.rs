//! crates/invoice_extraction_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the extraction pipeline.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific databases, file stores and inference vendors.

use crate::domain::{ExtractedInvoice, Invoice, InvoiceStatus, InvoiceUpdate, MediaType};
use crate::normalizer;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// One schema violation, located by a field path such as `lineItems[0].unitPrice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The error taxonomy shared by every port and by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        violations: Vec<FieldViolation>,
    },
    #[error("File upload error: {0}")]
    FileUpload(String),
    #[error("Provider configuration error: {0}")]
    ProviderConfiguration(String),
    #[error("Extraction error: {0}")]
    Extraction(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// A validation error carrying field violations; the message lists them all.
    pub fn invalid_fields(violations: Vec<FieldViolation>) -> Self {
        let message = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        PortError::Validation {
            message,
            violations,
        }
    }

    /// A validation error about caller input that is not tied to one field.
    pub fn invalid(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            violations: Vec::new(),
        }
    }

    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PortError::NotFound(_) => "NotFound",
            PortError::Validation { .. } => "ValidationError",
            PortError::FileUpload(_) => "FileUploadError",
            PortError::ProviderConfiguration(_) => "ProviderConfigurationError",
            PortError::Extraction(_) => "ExtractionError",
            PortError::Parse(_) => "ParseError",
            PortError::Unexpected(_) => "Unexpected",
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports
//=========================================================================================

/// Durable storage for invoice records and their line items.
///
/// Implementations must make `commit_extraction` and `apply_update` atomic:
/// the field update and the wholesale line-item replacement either both land
/// or neither does.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_invoice(&self, invoice: &Invoice) -> PortResult<()>;

    async fn get_invoice(&self, id: Uuid) -> PortResult<Invoice>;

    /// Returns one window of records, newest first, and the total record count.
    async fn list_invoices(&self, offset: u64, limit: u64) -> PortResult<(Vec<Invoice>, u64)>;

    async fn set_status(&self, id: Uuid, status: InvoiceStatus) -> PortResult<()>;

    async fn commit_extraction(
        &self,
        id: Uuid,
        payload: &ExtractedInvoice,
        raw_reply: &Value,
        provider: &str,
    ) -> PortResult<Invoice>;

    async fn apply_update(
        &self,
        id: Uuid,
        update: &InvoiceUpdate,
        status: InvoiceStatus,
    ) -> PortResult<Invoice>;

    /// Deletes the record and, by ownership, all of its line items.
    async fn delete_invoice(&self, id: Uuid) -> PortResult<()>;
}

/// Holds uploaded document bytes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores the bytes and returns the key to load them with later.
    async fn save(&self, id: Uuid, file_name: &str, bytes: &[u8]) -> PortResult<String>;

    async fn load(&self, storage_key: &str) -> PortResult<Vec<u8>>;

    async fn remove(&self, storage_key: &str) -> PortResult<()>;
}

//=========================================================================================
// Extraction Ports
//=========================================================================================

/// Converts a paginated document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, bytes: &[u8]) -> PortResult<String>;
}

/// A vendor's raw reply: the text the model produced plus an audit artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub text: String,
    pub raw: Value,
}

/// A pluggable inference backend that turns document bytes into a reply.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// The registry name, recorded on records this provider extracts.
    fn name(&self) -> &str;

    async fn extract(&self, bytes: &[u8], media_type: MediaType) -> PortResult<ProviderReply>;

    /// Runs the provider and normalizes its reply into a payload.
    async fn extract_payload(
        &self,
        bytes: &[u8],
        media_type: MediaType,
    ) -> PortResult<(ExtractedInvoice, Value)> {
        let reply = self.extract(bytes, media_type).await?;
        let payload = normalizer::normalize(&reply.text)?;
        Ok((payload, reply.raw))
    }
}
