pub mod db;
pub mod disk;
pub mod gemini;
pub mod openai;
pub mod pdf_text;
pub mod registry;

pub use db::DbAdapter;
pub use disk::LocalDocumentStore;
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use pdf_text::PdfTextAdapter;
pub use registry::build_provider_registry;
