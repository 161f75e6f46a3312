//! services/api/src/web/dto.rs
//!
//! Request and response payloads of the REST API, and their conversions
//! to and from the domain types.

use chrono::{DateTime, Utc};
use invoice_extraction_core::domain::{Invoice, InvoicePage, InvoiceStatus, InvoiceUpdate, LineItem};
use invoice_extraction_core::ports::{FieldViolation, PortError, PortResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Default page size of `GET /api/invoices`.
pub const DEFAULT_PAGE_LIMIT: i64 = 10;

//=========================================================================================
// Response Payloads
//=========================================================================================

/// One itemized charge row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDto {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_total: f64,
}

impl From<&LineItem> for LineItemDto {
    fn from(item: &LineItem) -> Self {
        Self {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total,
        }
    }
}

impl From<LineItemDto> for LineItem {
    fn from(dto: LineItemDto) -> Self {
        Self {
            description: dto.description,
            quantity: dto.quantity,
            unit_price: dto.unit_price,
            line_total: dto.line_total,
        }
    }
}

/// An invoice record as returned to API callers.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDto {
    pub id: Uuid,
    #[schema(example = "EXTRACTED")]
    pub status: String,
    pub file_name: String,
    #[schema(example = "application/pdf")]
    pub file_type: String,
    pub file_size: u64,
    /// Where the uploaded file can be downloaded from.
    pub file_url: String,
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub currency: Option<String>,
    pub subtotal: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total: Option<f64>,
    pub confidence: Option<f64>,
    /// The provider's unmodified reply, kept for audit.
    #[schema(value_type = Option<Object>)]
    pub raw_llm_json: Option<Value>,
    pub llm_provider: Option<String>,
    pub line_items: Vec<LineItemDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Invoice> for InvoiceDto {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id,
            status: invoice.status.to_string(),
            file_name: invoice.file.file_name.clone(),
            file_type: invoice.file.media_type.mime().to_string(),
            file_size: invoice.file.size_bytes,
            file_url: format!("/uploads/{}", invoice.file.storage_key),
            supplier_name: invoice.supplier_name.clone(),
            invoice_number: invoice.invoice_number.clone(),
            invoice_date: invoice.invoice_date.clone(),
            due_date: invoice.due_date.clone(),
            currency: invoice.currency.clone(),
            subtotal: invoice.subtotal,
            tax_amount: invoice.tax_amount,
            total: invoice.total,
            confidence: invoice.confidence,
            raw_llm_json: invoice.raw_reply.clone(),
            llm_provider: invoice.provider.clone(),
            line_items: invoice.line_items.iter().map(LineItemDto::from).collect(),
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}

/// The envelope around a single record.
#[derive(Serialize, ToSchema)]
pub struct InvoiceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: InvoiceDto,
}

impl InvoiceResponse {
    pub fn new(invoice: &Invoice, message: Option<&str>) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
            data: InvoiceDto::from(invoice),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginationDto {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// One page of records, newest first.
#[derive(Serialize, ToSchema)]
pub struct InvoiceListResponse {
    pub success: bool,
    pub data: Vec<InvoiceDto>,
    pub pagination: PaginationDto,
}

impl From<&InvoicePage> for InvoiceListResponse {
    fn from(page: &InvoicePage) -> Self {
        Self {
            success: true,
            data: page.invoices.iter().map(InvoiceDto::from).collect(),
            pagination: PaginationDto {
                page: page.page,
                limit: page.limit,
                total: page.total,
                total_pages: page.total_pages,
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct ProvidersDto {
    pub providers: Vec<String>,
    pub default: String,
}

#[derive(Serialize, ToSchema)]
pub struct ProvidersResponse {
    pub success: bool,
    pub data: ProvidersDto,
}

//=========================================================================================
// Request Payloads
//=========================================================================================

/// Query parameters of the extraction endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProviderQuery {
    /// Registered provider name; the configured default when omitted.
    pub provider: Option<String>,
}

/// Query parameters of the list endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// 1-based page number (default 1).
    pub page: Option<i64>,
    /// Page size between 1 and 100 (default 10).
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT)
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A reviewer's edit. Absent fields are left untouched, `null` clears a field.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub supplier_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub invoice_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub invoice_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub due_date: Option<Option<String>>,
    /// Can be replaced but not cleared.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub currency: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<f64>)]
    pub subtotal: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<f64>)]
    pub tax_amount: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<f64>)]
    pub total: Option<Option<f64>>,
    /// Replaces every line item when present.
    pub line_items: Option<Vec<LineItemDto>>,
    /// Target status; `SAVED` when omitted.
    #[schema(example = "SAVED")]
    pub status: Option<String>,
}

impl UpdateInvoiceRequest {
    /// Converts the request into a domain update, collecting every invalid field.
    pub fn into_update(self) -> PortResult<InvoiceUpdate> {
        let mut violations = Vec::new();

        let currency = match self.currency {
            None => None,
            Some(None) => {
                violations.push(FieldViolation::new("currency", "cannot be cleared"));
                None
            }
            Some(Some(currency)) => Some(currency),
        };

        let status = match self.status.as_deref().map(str::parse::<InvoiceStatus>) {
            None => None,
            Some(Ok(status)) => Some(status),
            Some(Err(e)) => {
                violations.push(FieldViolation::new("status", e));
                None
            }
        };

        if !violations.is_empty() {
            return Err(PortError::invalid_fields(violations));
        }

        Ok(InvoiceUpdate {
            supplier_name: self.supplier_name,
            invoice_number: self.invoice_number,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            currency,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            total: self.total,
            line_items: self
                .line_items
                .map(|items| items.into_iter().map(LineItem::from).collect()),
            status,
        })
    }
}
