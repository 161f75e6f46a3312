//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every request handler.

use crate::config::Config;
use invoice_extraction_core::orchestrator::ExtractionOrchestrator;
use invoice_extraction_core::upload::UploadPolicy;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ExtractionOrchestrator>,
    pub upload_policy: UploadPolicy,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ExtractionOrchestrator>, config: Arc<Config>) -> Self {
        Self {
            orchestrator,
            upload_policy: config.upload_policy,
            config,
        }
    }
}
