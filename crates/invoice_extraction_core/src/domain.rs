//! crates/invoice_extraction_core/src/domain.rs
//!
//! Defines the pure, core data structures for the extraction pipeline.
//! These structs are independent of any database or wire format.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Currency assumed when a reply does not name one.
pub const DEFAULT_CURRENCY: &str = "USD";

//=========================================================================================
// Status and Media Types
//=========================================================================================

/// The processing lifecycle of an invoice record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceStatus {
    Uploaded,
    Processing,
    Extracted,
    /// Reserved for low-confidence review flows. No pipeline transition produces it.
    NeedsReview,
    Saved,
    Error,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Uploaded,
        InvoiceStatus::Processing,
        InvoiceStatus::Extracted,
        InvoiceStatus::NeedsReview,
        InvoiceStatus::Saved,
        InvoiceStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Uploaded => "UPLOADED",
            InvoiceStatus::Processing => "PROCESSING",
            InvoiceStatus::Extracted => "EXTRACTED",
            InvoiceStatus::NeedsReview => "NEEDS_REVIEW",
            InvoiceStatus::Saved => "SAVED",
            InvoiceStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown invoice status '{}'", s))
    }
}

/// The document formats accepted for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Pdf,
    Jpeg,
    Png,
}

impl MediaType {
    /// Parses a declared MIME type. `image/jpg` is accepted as an alias of `image/jpeg`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => Some(MediaType::Pdf),
            "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
        }
    }

    /// File extensions (lowercase, with the leading dot) valid for this type.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            MediaType::Pdf => &[".pdf"],
            MediaType::Jpeg => &[".jpg", ".jpeg"],
            MediaType::Png => &[".png"],
        }
    }

    /// Images go straight to a multimodal call; PDFs take the text path.
    pub fn is_image(&self) -> bool {
        matches!(self, MediaType::Jpeg | MediaType::Png)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

//=========================================================================================
// Records
//=========================================================================================

/// Metadata of the uploaded file. Immutable once the record is created.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub file_name: String,
    pub media_type: MediaType,
    pub size_bytes: u64,
    /// Opaque key returned by the `DocumentStore` that holds the bytes.
    pub storage_key: String,
}

/// One itemized charge row. Line items have no identity of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_total: f64,
}

/// A persisted invoice document and its extraction results.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    pub status: InvoiceStatus,
    pub file: FileMetadata,
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub currency: Option<String>,
    pub subtotal: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total: Option<f64>,
    pub confidence: Option<f64>,
    /// The provider's raw reply, kept for audit only.
    pub raw_reply: Option<Value>,
    pub provider: Option<String>,
    pub line_items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Builds a freshly uploaded record with no extracted fields.
    pub fn uploaded(id: Uuid, file: FileMetadata) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: InvoiceStatus::Uploaded,
            file,
            supplier_name: None,
            invoice_number: None,
            invoice_date: None,
            due_date: None,
            currency: None,
            subtotal: None,
            tax_amount: None,
            total: None,
            confidence: None,
            raw_reply: None,
            provider: None,
            line_items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Copies a normalized extraction onto the record and marks it `EXTRACTED`.
    pub fn apply_extraction(&mut self, payload: &ExtractedInvoice, raw_reply: &Value, provider: &str) {
        self.status = InvoiceStatus::Extracted;
        self.supplier_name = payload.supplier_name.clone();
        self.invoice_number = payload.invoice_number.clone();
        self.invoice_date = payload.invoice_date.clone();
        self.due_date = payload.due_date.clone();
        self.currency = Some(payload.currency.clone());
        self.subtotal = payload.subtotal;
        self.tax_amount = payload.tax_amount;
        self.total = payload.total;
        self.confidence = Some(payload.confidence);
        self.raw_reply = Some(raw_reply.clone());
        self.provider = Some(provider.to_string());
        self.line_items = payload.line_items.clone();
        self.updated_at = Utc::now();
    }

    /// Applies the fields present in `update` and forces `status`.
    pub fn apply_update(&mut self, update: &InvoiceUpdate, status: InvoiceStatus) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<Option<T>>) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }

        set(&mut self.supplier_name, &update.supplier_name);
        set(&mut self.invoice_number, &update.invoice_number);
        set(&mut self.invoice_date, &update.invoice_date);
        set(&mut self.due_date, &update.due_date);
        set(&mut self.subtotal, &update.subtotal);
        set(&mut self.tax_amount, &update.tax_amount);
        set(&mut self.total, &update.total);
        if let Some(currency) = &update.currency {
            self.currency = Some(currency.clone());
        }
        if let Some(items) = &update.line_items {
            self.line_items = items.clone();
        }
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// The normalizer's output. Never stored directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedInvoice {
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub currency: String,
    pub subtotal: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total: Option<f64>,
    pub line_items: Vec<LineItem>,
    pub confidence: f64,
}

/// A partial update from a reviewer.
///
/// The outer `Option` is presence: `None` leaves the field untouched, while
/// `Some(None)` clears it. Currency can be replaced but never cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceUpdate {
    pub supplier_name: Option<Option<String>>,
    pub invoice_number: Option<Option<String>>,
    pub invoice_date: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
    pub currency: Option<String>,
    pub subtotal: Option<Option<f64>>,
    pub tax_amount: Option<Option<f64>>,
    pub total: Option<Option<f64>>,
    pub line_items: Option<Vec<LineItem>>,
    pub status: Option<InvoiceStatus>,
}

/// A page of invoices plus the pagination summary.
#[derive(Debug, Clone)]
pub struct InvoicePage {
    pub invoices: Vec<Invoice>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.as_str().parse::<InvoiceStatus>(), Ok(status));
        }
        assert!("processing".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn jpg_alias_is_accepted() {
        assert_eq!(MediaType::from_mime("image/jpg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime("IMAGE/PNG"), Some(MediaType::Png));
        assert_eq!(MediaType::from_mime("text/plain"), None);
        assert!(!MediaType::Pdf.is_image());
    }

    #[test]
    fn update_distinguishes_absent_from_null() {
        let file = FileMetadata {
            file_name: "a.png".into(),
            media_type: MediaType::Png,
            size_bytes: 3,
            storage_key: "k".into(),
        };
        let mut invoice = Invoice::uploaded(Uuid::new_v4(), file);
        invoice.supplier_name = Some("Acme".into());
        invoice.invoice_number = Some("INV-1".into());

        let update = InvoiceUpdate {
            supplier_name: Some(None),
            ..Default::default()
        };
        invoice.apply_update(&update, InvoiceStatus::Saved);

        assert_eq!(invoice.supplier_name, None);
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-1"));
        assert_eq!(invoice.status, InvoiceStatus::Saved);
    }
}
