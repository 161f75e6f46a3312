//! crates/invoice_extraction_core/src/upload.rs
//!
//! Boundary checks applied to an uploaded file before any record exists.

use crate::domain::MediaType;
use crate::ports::{PortError, PortResult};
use std::path::Path;

pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Accepted formats and the size ceiling for uploads.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_FILE_SIZE_MB * BYTES_PER_MEGABYTE,
        }
    }
}

impl UploadPolicy {
    /// Returns `None` when the ceiling does not fit in a byte count.
    pub fn from_megabytes(megabytes: u64) -> Option<Self> {
        megabytes
            .checked_mul(BYTES_PER_MEGABYTE)
            .map(|max_bytes| Self { max_bytes })
    }

    /// Checks the declared type, the extension and the size of an upload.
    pub fn validate(&self, file_name: &str, content_type: &str, size: u64) -> PortResult<MediaType> {
        let media_type = MediaType::from_mime(content_type).ok_or_else(|| {
            PortError::FileUpload(format!(
                "Invalid file type: {}. Allowed: PDF, JPG, PNG",
                content_type
            ))
        })?;

        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default();
        if !media_type.extensions().contains(&extension.as_str()) {
            return Err(PortError::FileUpload(format!(
                "Invalid file extension '{}' for {}. Allowed: {}",
                extension,
                media_type,
                media_type.extensions().join(", ")
            )));
        }

        if size == 0 {
            return Err(PortError::FileUpload("Uploaded file is empty".to_string()));
        }
        if size > self.max_bytes {
            return Err(PortError::FileUpload(format!(
                "File too large. Maximum size is {}MB",
                self.max_bytes / BYTES_PER_MEGABYTE
            )));
        }

        Ok(media_type)
    }
}
