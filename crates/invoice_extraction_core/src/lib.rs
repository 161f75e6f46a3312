pub mod domain;
pub mod memory;
pub mod normalizer;
pub mod orchestrator;
pub mod ports;
pub mod prompts;
pub mod provider;
pub mod upload;

pub use domain::{
    ExtractedInvoice, FileMetadata, Invoice, InvoicePage, InvoiceStatus, InvoiceUpdate, LineItem,
    MediaType,
};
pub use orchestrator::ExtractionOrchestrator;
pub use ports::{
    DocumentStore, ExtractionProvider, FieldViolation, PortError, PortResult, ProviderReply,
    RecordStore, TextExtractor,
};
pub use provider::{InferenceBackend, PromptedProvider, ProviderRegistry};
pub use upload::UploadPolicy;
