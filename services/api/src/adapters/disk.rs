//! services/api/src/adapters/disk.rs
//!
//! Stores uploaded documents as files in a local directory.

use async_trait::async_trait;
use invoice_extraction_core::ports::{DocumentStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// A `DocumentStore` backed by one flat directory.
///
/// Keys are bare file names (`invoice-<uuid><ext>`), so the directory can be
/// served read-only under `/uploads` without exposing anything else.
#[derive(Clone, Debug)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the upload directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, storage_key: &str) -> PortResult<PathBuf> {
        let valid = !storage_key.is_empty()
            && !storage_key.contains(['/', '\\'])
            && storage_key != "."
            && storage_key != "..";
        if !valid {
            return Err(PortError::NotFound(format!("No stored file for key '{}'", storage_key)));
        }
        Ok(self.root.join(storage_key))
    }
}

/// Builds the storage key from the record id and the original extension.
fn storage_key(id: Uuid, file_name: &str) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("invoice-{}{}", id, extension)
}

fn io_error(key: &str, e: std::io::Error) -> PortError {
    if e.kind() == ErrorKind::NotFound {
        PortError::NotFound(format!("No stored file for key '{}'", key))
    } else {
        PortError::Unexpected(format!("File store failure for '{}': {}", key, e))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn save(&self, id: Uuid, file_name: &str, bytes: &[u8]) -> PortResult<String> {
        let key = storage_key(id, file_name);
        let path = self.path_for(&key)?;
        self.ensure_dir().await.map_err(|e| io_error(&key, e))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_error(&key, e))?;
        debug!(key = %key, size = bytes.len(), "Stored uploaded document");
        Ok(key)
    }

    async fn load(&self, storage_key: &str) -> PortResult<Vec<u8>> {
        let path = self.path_for(storage_key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(storage_key, e))
    }

    async fn remove(&self, storage_key: &str) -> PortResult<()> {
        let path = self.path_for(storage_key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| io_error(storage_key, e))
    }
}
