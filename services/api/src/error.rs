//! services/api/src/error.rs
//!
//! Defines the error types for the API service: `ApiError` for startup
//! failures and `HttpError` for failures reported to HTTP callers.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use invoice_extraction_core::ports::PortError;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// The primary error type for starting the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//=========================================================================================
// HTTP Error Responses
//=========================================================================================

/// One offending field in a validation failure.
#[derive(Serialize, ToSchema)]
pub struct ErrorDetail {
    pub field: String,
    pub message: String,
}

/// The JSON body of every failed request.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    /// Distinguishing error kind, e.g. `NotFound` or `ParseError`.
    pub kind: String,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

/// A `PortError` on its way back to an HTTP caller.
#[derive(Debug)]
pub struct HttpError(pub PortError);

impl From<PortError> for HttpError {
    fn from(err: PortError) -> Self {
        Self(err)
    }
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PortError::NotFound(_) => StatusCode::NOT_FOUND,
            PortError::Validation { .. }
            | PortError::FileUpload(_)
            | PortError::ProviderConfiguration(_) => StatusCode::BAD_REQUEST,
            PortError::Extraction(_) | PortError::Parse(_) => StatusCode::BAD_GATEWAY,
            PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), "Request failed: {}", self.0);
        }

        let details = match &self.0 {
            PortError::Validation { violations, .. } => violations
                .iter()
                .map(|v| ErrorDetail {
                    field: v.field.clone(),
                    message: v.message.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };
        let error = match &self.0 {
            // Adapter failures may carry connection strings or SQL; keep them in the logs.
            PortError::Unexpected(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody {
            success: false,
            kind: self.0.kind().to_string(),
            error,
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoice_extraction_core::ports::FieldViolation;

    #[test]
    fn maps_each_kind_to_a_status() {
        let cases = [
            (PortError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PortError::invalid("bad"), StatusCode::BAD_REQUEST),
            (PortError::FileUpload("big".into()), StatusCode::BAD_REQUEST),
            (PortError::ProviderConfiguration("key".into()), StatusCode::BAD_REQUEST),
            (PortError::Extraction("down".into()), StatusCode::BAD_GATEWAY),
            (PortError::Parse("prose".into()), StatusCode::BAD_GATEWAY),
            (PortError::Unexpected("db".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(HttpError(err).status(), status);
        }
    }

    #[test]
    fn validation_details_name_the_fields() {
        let err = PortError::invalid_fields(vec![FieldViolation::new("lineItems[0].unitPrice", "is required")]);
        let response = HttpError(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
