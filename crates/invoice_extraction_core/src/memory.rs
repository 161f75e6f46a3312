//! crates/invoice_extraction_core/src/memory.rs
//!
//! In-memory implementations of the storage ports.
//!
//! Each store keeps its state behind a single mutex, so every operation
//! (including extraction commits with line-item replacement) is atomic.

use crate::domain::{ExtractedInvoice, Invoice, InvoiceStatus, InvoiceUpdate};
use crate::ports::{DocumentStore, PortError, PortResult, RecordStore};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

//=========================================================================================
// Record Store
//=========================================================================================

#[derive(Default)]
struct Records {
    by_id: HashMap<Uuid, (u64, Invoice)>,
    next_seq: u64,
}

/// A `RecordStore` backed by a `HashMap`.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Records>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        // A panic while holding the lock cannot leave a record half-written.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn modify<T>(&self, id: Uuid, f: impl FnOnce(&mut Invoice) -> T) -> PortResult<T> {
        let mut records = self.lock();
        let (_, invoice) = records
            .by_id
            .get_mut(&id)
            .ok_or_else(|| not_found(id))?;
        Ok(f(invoice))
    }
}

fn not_found(id: Uuid) -> PortError {
    PortError::NotFound(format!("Invoice {} not found", id))
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_invoice(&self, invoice: &Invoice) -> PortResult<()> {
        let mut records = self.lock();
        if records.by_id.contains_key(&invoice.id) {
            return Err(PortError::Unexpected(format!(
                "Invoice {} already exists",
                invoice.id
            )));
        }
        let seq = records.next_seq;
        records.next_seq += 1;
        records.by_id.insert(invoice.id, (seq, invoice.clone()));
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> PortResult<Invoice> {
        self.lock()
            .by_id
            .get(&id)
            .map(|(_, invoice)| invoice.clone())
            .ok_or_else(|| not_found(id))
    }

    async fn list_invoices(&self, offset: u64, limit: u64) -> PortResult<(Vec<Invoice>, u64)> {
        let records = self.lock();
        let mut all: Vec<&(u64, Invoice)> = records.by_id.values().collect();
        all.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        let total = all.len() as u64;
        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(_, invoice)| invoice.clone())
            .collect();
        Ok((page, total))
    }

    async fn set_status(&self, id: Uuid, status: InvoiceStatus) -> PortResult<()> {
        self.modify(id, |invoice| {
            invoice.status = status;
            invoice.updated_at = Utc::now();
        })
    }

    async fn commit_extraction(
        &self,
        id: Uuid,
        payload: &ExtractedInvoice,
        raw_reply: &Value,
        provider: &str,
    ) -> PortResult<Invoice> {
        self.modify(id, |invoice| {
            invoice.apply_extraction(payload, raw_reply, provider);
            invoice.clone()
        })
    }

    async fn apply_update(
        &self,
        id: Uuid,
        update: &InvoiceUpdate,
        status: InvoiceStatus,
    ) -> PortResult<Invoice> {
        self.modify(id, |invoice| {
            invoice.apply_update(update, status);
            invoice.clone()
        })
    }

    async fn delete_invoice(&self, id: Uuid) -> PortResult<()> {
        self.lock()
            .by_id
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }
}

//=========================================================================================
// Document Store
//=========================================================================================

/// A `DocumentStore` that keeps uploaded bytes in memory.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, storage_key: &str) -> bool {
        self.lock().contains_key(storage_key)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn save(&self, id: Uuid, file_name: &str, bytes: &[u8]) -> PortResult<String> {
        let key = format!("{}/{}", id, file_name);
        self.lock().insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    async fn load(&self, storage_key: &str) -> PortResult<Vec<u8>> {
        self.lock()
            .get(storage_key)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Document bytes {} not found", storage_key)))
    }

    async fn remove(&self, storage_key: &str) -> PortResult<()> {
        self.lock()
            .remove(storage_key)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Document bytes {} not found", storage_key)))
    }
}
