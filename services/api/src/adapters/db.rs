//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RecordStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use invoice_extraction_core::domain::{
    ExtractedInvoice, FileMetadata, Invoice, InvoiceStatus, InvoiceUpdate, LineItem, MediaType,
};
use invoice_extraction_core::ports::{PortError, PortResult, RecordStore};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "id, status, file_name, file_type, file_size, storage_key, \
    supplier_name, invoice_number, invoice_date, due_date, currency, subtotal, tax_amount, \
    total, confidence, raw_llm_json, llm_provider, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RecordStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn line_items_for(&self, ids: &[Uuid]) -> PortResult<HashMap<Uuid, Vec<LineItem>>> {
        let records = sqlx::query_as::<_, LineItemRecord>(
            "SELECT invoice_id, description, quantity, unit_price, line_total \
             FROM line_items WHERE invoice_id = ANY($1) ORDER BY invoice_id, position ASC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut grouped: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for record in records {
            grouped
                .entry(record.invoice_id)
                .or_default()
                .push(record.to_domain());
        }
        Ok(grouped)
    }

    async fn fetch_invoice(&self, id: Uuid) -> PortResult<Invoice> {
        let record = sqlx::query_as::<_, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices WHERE id = $1",
            INVOICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(id))?;

        let mut items = self.line_items_for(&[id]).await?;
        record.to_domain(items.remove(&id).unwrap_or_default())
    }
}

fn db_error(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(id: Uuid) -> PortError {
    PortError::NotFound(format!("Invoice {} not found", id))
}

/// Deletes every line item of the invoice and inserts `items` in order.
async fn replace_line_items(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
    items: &[LineItem],
) -> PortResult<()> {
    sqlx::query("DELETE FROM line_items WHERE invoice_id = $1")
        .bind(invoice_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;

    if items.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO line_items (invoice_id, position, description, quantity, unit_price, line_total) ",
    );
    builder.push_values(items.iter().enumerate(), |mut row, (position, item)| {
        row.push_bind(invoice_id)
            .push_bind(position as i32)
            .push_bind(item.description.clone())
            .push_bind(item.quantity)
            .push_bind(item.unit_price)
            .push_bind(item.line_total);
    });
    builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    Ok(())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct InvoiceRecord {
    id: Uuid,
    status: String,
    file_name: String,
    file_type: String,
    file_size: i64,
    storage_key: String,
    supplier_name: Option<String>,
    invoice_number: Option<String>,
    invoice_date: Option<String>,
    due_date: Option<String>,
    currency: Option<String>,
    subtotal: Option<f64>,
    tax_amount: Option<f64>,
    total: Option<f64>,
    confidence: Option<f64>,
    raw_llm_json: Option<Value>,
    llm_provider: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl InvoiceRecord {
    fn to_domain(self, line_items: Vec<LineItem>) -> PortResult<Invoice> {
        let status = self
            .status
            .parse::<InvoiceStatus>()
            .map_err(PortError::Unexpected)?;
        let media_type = MediaType::from_mime(&self.file_type).ok_or_else(|| {
            PortError::Unexpected(format!("Stored file type '{}' is not supported", self.file_type))
        })?;

        Ok(Invoice {
            id: self.id,
            status,
            file: FileMetadata {
                file_name: self.file_name,
                media_type,
                size_bytes: self.file_size.max(0) as u64,
                storage_key: self.storage_key,
            },
            supplier_name: self.supplier_name,
            invoice_number: self.invoice_number,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            currency: self.currency,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            total: self.total,
            confidence: self.confidence,
            raw_reply: self.raw_llm_json,
            provider: self.llm_provider,
            line_items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct LineItemRecord {
    invoice_id: Uuid,
    description: String,
    quantity: f64,
    unit_price: f64,
    line_total: f64,
}
impl LineItemRecord {
    fn to_domain(self) -> LineItem {
        LineItem {
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            line_total: self.line_total,
        }
    }
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for DbAdapter {
    async fn insert_invoice(&self, invoice: &Invoice) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO invoices (id, status, file_name, file_type, file_size, storage_key, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(invoice.id)
        .bind(invoice.status.as_str())
        .bind(&invoice.file.file_name)
        .bind(invoice.file.media_type.mime())
        .bind(invoice.file.size_bytes as i64)
        .bind(&invoice.file.storage_key)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> PortResult<Invoice> {
        self.fetch_invoice(id).await
    }

    async fn list_invoices(&self, offset: u64, limit: u64) -> PortResult<(Vec<Invoice>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let records = sqlx::query_as::<_, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            INVOICE_COLUMNS
        ))
        .bind(limit.min(i64::MAX as u64) as i64)
        .bind(offset.min(i64::MAX as u64) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let mut items = self.line_items_for(&ids).await?;
        let invoices = records
            .into_iter()
            .map(|record| {
                let line_items = items.remove(&record.id).unwrap_or_default();
                record.to_domain(line_items)
            })
            .collect::<PortResult<Vec<_>>>()?;

        Ok((invoices, total.max(0) as u64))
    }

    async fn set_status(&self, id: Uuid, status: InvoiceStatus) -> PortResult<()> {
        let result = sqlx::query("UPDATE invoices SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn commit_extraction(
        &self,
        id: Uuid,
        payload: &ExtractedInvoice,
        raw_reply: &Value,
        provider: &str,
    ) -> PortResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let result = sqlx::query(
            "UPDATE invoices SET status = $2, supplier_name = $3, invoice_number = $4, \
             invoice_date = $5, due_date = $6, currency = $7, subtotal = $8, tax_amount = $9, \
             total = $10, confidence = $11, raw_llm_json = $12, llm_provider = $13, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(InvoiceStatus::Extracted.as_str())
        .bind(&payload.supplier_name)
        .bind(&payload.invoice_number)
        .bind(&payload.invoice_date)
        .bind(&payload.due_date)
        .bind(&payload.currency)
        .bind(payload.subtotal)
        .bind(payload.tax_amount)
        .bind(payload.total)
        .bind(payload.confidence)
        .bind(Json(raw_reply))
        .bind(provider)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }

        replace_line_items(&mut tx, id, &payload.line_items).await?;
        tx.commit().await.map_err(db_error)?;

        self.fetch_invoice(id).await
    }

    async fn apply_update(
        &self,
        id: Uuid,
        update: &InvoiceUpdate,
        status: InvoiceStatus,
    ) -> PortResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE invoices SET updated_at = now(), status = ");
        builder.push_bind(status.as_str());

        let text_fields = [
            ("supplier_name", &update.supplier_name),
            ("invoice_number", &update.invoice_number),
            ("invoice_date", &update.invoice_date),
            ("due_date", &update.due_date),
        ];
        for (column, value) in text_fields {
            if let Some(value) = value {
                builder.push(format!(", {} = ", column)).push_bind(value.clone());
            }
        }
        let amount_fields = [
            ("subtotal", &update.subtotal),
            ("tax_amount", &update.tax_amount),
            ("total", &update.total),
        ];
        for (column, value) in amount_fields {
            if let Some(value) = value {
                builder.push(format!(", {} = ", column)).push_bind(*value);
            }
        }
        if let Some(currency) = &update.currency {
            builder.push(", currency = ").push_bind(currency.clone());
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }

        if let Some(items) = &update.line_items {
            replace_line_items(&mut tx, id, items).await?;
        }
        tx.commit().await.map_err(db_error)?;

        self.fetch_invoice(id).await
    }

    async fn delete_invoice(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}
