//! crates/invoice_extraction_core/src/orchestrator.rs
//!
//! The extraction state machine.
//!
//! `ExtractionOrchestrator` owns the status transitions of an invoice record:
//! it marks a record `PROCESSING` before any provider call, then commits either
//! the normalized extraction (`EXTRACTED`) or the failure (`ERROR`) before
//! returning. A record is never left in `PROCESSING` once `extract` returns,
//! and a dropped `extract` future schedules a compensating `ERROR` write.

use crate::domain::{FileMetadata, Invoice, InvoicePage, InvoiceStatus, InvoiceUpdate, MediaType};
use crate::ports::{DocumentStore, FieldViolation, PortError, PortResult, RecordStore};
use crate::provider::ProviderRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);
pub const MAX_PAGE_LIMIT: i64 = 100;

type LockTable = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>;

//=========================================================================================
// The Orchestrator
//=========================================================================================

/// Drives invoice records through upload, extraction, review and deletion.
pub struct ExtractionOrchestrator {
    records: Arc<dyn RecordStore>,
    documents: Arc<dyn DocumentStore>,
    providers: Arc<ProviderRegistry>,
    provider_timeout: Duration,
    extraction_locks: LockTable,
}

impl ExtractionOrchestrator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        documents: Arc<dyn DocumentStore>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            records,
            documents,
            providers,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            extraction_locks: LockTable::default(),
        }
    }

    /// Sets how long a single provider call may take before it is abandoned.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Stores the uploaded bytes and creates a record in `UPLOADED`.
    pub async fn create(&self, bytes: &[u8], file_name: &str, media_type: MediaType) -> PortResult<Invoice> {
        let id = Uuid::new_v4();
        let storage_key = self.documents.save(id, file_name, bytes).await?;

        let invoice = Invoice::uploaded(
            id,
            FileMetadata {
                file_name: file_name.to_string(),
                media_type,
                size_bytes: bytes.len() as u64,
                storage_key,
            },
        );

        if let Err(e) = self.records.insert_invoice(&invoice).await {
            if let Err(remove_err) = self.documents.remove(&invoice.file.storage_key).await {
                warn!(invoice_id = %id, "Failed to remove bytes of an uninserted invoice: {}", remove_err);
            }
            return Err(e);
        }

        info!(invoice_id = %id, file_name, %media_type, size = invoice.file.size_bytes, "Invoice uploaded");
        Ok(invoice)
    }

    /// Runs a provider over the record's document and commits the result.
    ///
    /// Callable from any state. Concurrent calls for the same id run one after
    /// the other. Every failure after the record is found leaves it in `ERROR`
    /// and is returned unchanged.
    pub async fn extract(&self, id: Uuid, provider_name: Option<&str>) -> PortResult<Invoice> {
        let permit = self.lock_extraction(id).await;

        let invoice = self.records.get_invoice(id).await?;
        self.records.set_status(id, InvoiceStatus::Processing).await?;
        let guard = ProcessingGuard::arm(id, self.records.clone(), permit);
        info!(invoice_id = %id, provider = provider_name.unwrap_or(self.providers.default_provider()), "Extraction started");

        let result = self.run_extraction(&invoice, provider_name).await;

        match result {
            Ok(extracted) => {
                guard.disarm();
                info!(
                    invoice_id = %id,
                    provider = extracted.provider.as_deref().unwrap_or_default(),
                    line_items = extracted.line_items.len(),
                    confidence = extracted.confidence.unwrap_or_default(),
                    "Extraction committed"
                );
                Ok(extracted)
            }
            Err(e) => {
                error!(invoice_id = %id, kind = e.kind(), "Extraction failed: {}", e);
                if let Err(status_err) = self.records.set_status(id, InvoiceStatus::Error).await {
                    error!(invoice_id = %id, "Failed to record extraction failure: {}", status_err);
                }
                guard.disarm();
                Err(e)
            }
        }
    }

    async fn run_extraction(&self, invoice: &Invoice, provider_name: Option<&str>) -> PortResult<Invoice> {
        let bytes = self
            .documents
            .load(&invoice.file.storage_key)
            .await
            .map_err(|e| match e {
                PortError::NotFound(msg) => {
                    PortError::Extraction(format!("Document bytes are unavailable: {}", msg))
                }
                other => other,
            })?;

        let provider = self.providers.resolve(provider_name)?;

        let (payload, raw_reply) = tokio::time::timeout(
            self.provider_timeout,
            provider.extract_payload(&bytes, invoice.file.media_type),
        )
        .await
        .map_err(|_| {
            PortError::Extraction(format!(
                "{} did not respond within {}s",
                provider.name(),
                self.provider_timeout.as_secs_f64()
            ))
        })??;

        self.records
            .commit_extraction(invoice.id, &payload, &raw_reply, provider.name())
            .await
    }

    /// Applies a reviewer's partial update. Status defaults to `SAVED`.
    pub async fn update(&self, id: Uuid, update: InvoiceUpdate) -> PortResult<Invoice> {
        if update.status == Some(InvoiceStatus::Processing) {
            return Err(PortError::invalid_fields(vec![FieldViolation::new(
                "status",
                "PROCESSING is set by extraction only",
            )]));
        }
        if matches!(&update.currency, Some(currency) if currency.trim().is_empty()) {
            return Err(PortError::invalid_fields(vec![FieldViolation::new(
                "currency",
                "must not be empty",
            )]));
        }

        let status = update.status.unwrap_or(InvoiceStatus::Saved);
        let updated = self.records.apply_update(id, &update, status).await?;
        info!(invoice_id = %id, %status, replaced_line_items = update.line_items.is_some(), "Invoice updated");
        Ok(updated)
    }

    /// Removes the record and its bytes. Failing to remove the bytes is only logged.
    pub async fn delete(&self, id: Uuid) -> PortResult<()> {
        let invoice = self.records.get_invoice(id).await?;

        if let Err(e) = self.documents.remove(&invoice.file.storage_key).await {
            warn!(invoice_id = %id, storage_key = %invoice.file.storage_key, "Failed to delete document bytes: {}", e);
        }

        self.records.delete_invoice(id).await?;
        info!(invoice_id = %id, "Invoice deleted");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> PortResult<Invoice> {
        self.records.get_invoice(id).await
    }

    /// Lists records newest first. `page` is 1-based; `limit` is at most `MAX_PAGE_LIMIT`.
    pub async fn list(&self, page: i64, limit: i64) -> PortResult<InvoicePage> {
        let mut violations = Vec::new();
        if page < 1 {
            violations.push(FieldViolation::new("page", "must be at least 1"));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            violations.push(FieldViolation::new(
                "limit",
                format!("must be between 1 and {}", MAX_PAGE_LIMIT),
            ));
        }
        if !violations.is_empty() {
            return Err(PortError::invalid_fields(violations));
        }

        let (page, limit) = (page as u64, limit as u64);
        let offset = (page - 1).saturating_mul(limit);
        let (invoices, total) = self.records.list_invoices(offset, limit).await?;

        Ok(InvoicePage {
            invoices,
            page: page.min(u32::MAX as u64) as u32,
            limit: limit as u32,
            total,
            total_pages: total.div_ceil(limit),
        })
    }

    async fn lock_extraction(&self, id: Uuid) -> ExtractionPermit {
        let lock = {
            let mut table = self
                .extraction_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            table.entry(id).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        ExtractionPermit {
            id,
            table: self.extraction_locks.clone(),
            guard: Some(guard),
        }
    }
}

//=========================================================================================
// Guards
//=========================================================================================

/// Holds the per-invoice extraction lock and prunes the lock table on release.
struct ExtractionPermit {
    id: Uuid,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ExtractionPermit {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if table
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.id);
        }
    }
}

/// Flips a record to `ERROR` if the extraction future is dropped mid-flight.
///
/// Owns the extraction permit, so the next queued extraction of the same id
/// only starts once the compensating write has landed.
struct ProcessingGuard {
    id: Uuid,
    records: Option<Arc<dyn RecordStore>>,
    permit: Option<ExtractionPermit>,
}

impl ProcessingGuard {
    fn arm(id: Uuid, records: Arc<dyn RecordStore>, permit: ExtractionPermit) -> Self {
        Self {
            id,
            records: Some(records),
            permit: Some(permit),
        }
    }

    /// Releases the permit without touching the record.
    fn disarm(mut self) {
        self.records = None;
        drop(self.permit.take());
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        let Some(records) = self.records.take() else {
            return;
        };
        let id = self.id;
        let permit = self.permit.take();
        warn!(invoice_id = %id, "Extraction abandoned while processing; scheduling ERROR status");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = records.set_status(id, InvoiceStatus::Error).await {
                        error!(invoice_id = %id, "Compensating status update failed: {}", e);
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                error!(invoice_id = %id, "No runtime available for the compensating status update");
            }
        }
    }
}
