//! Binary storage contracts
//!
//! Storage adapters hold the files attached to resources. Concrete disk
//! storage and its retry/fallback decorators live in `figgy-store`.

pub mod memory;

pub use memory::MemoryStorage;

use crate::errors::{FiggyError, Result};
use crate::model::Resource;
use figgy_core_types::FileId;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the bytes of a stored file live
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Disk(PathBuf),
    Bytes(Arc<[u8]>),
}

/// A file handle returned by a storage adapter
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    id: FileId,
    content: FileContent,
    digest: Option<String>,
}

impl StoredFile {
    pub fn on_disk(id: FileId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            content: FileContent::Disk(path.into()),
            digest: None,
        }
    }

    pub fn in_memory(id: FileId, bytes: Arc<[u8]>) -> Self {
        Self {
            id,
            content: FileContent::Bytes(bytes),
            digest: None,
        }
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    pub fn disk_path(&self) -> Option<&Path> {
        match &self.content {
            FileContent::Disk(path) => Some(path),
            FileContent::Bytes(_) => None,
        }
    }

    /// Same content reported under a different id
    pub fn with_id(mut self, id: FileId) -> Self {
        self.id = id;
        self
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// SHA-256 hex digest, when the adapter computed one at upload
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        match &self.content {
            FileContent::Disk(path) => std::fs::read(path).map_err(|e| self.io_error(&e)),
            FileContent::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }

    pub fn size(&self) -> Result<u64> {
        match &self.content {
            FileContent::Disk(path) => std::fs::metadata(path)
                .map(|m| m.len())
                .map_err(|e| self.io_error(&e)),
            FileContent::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }

    fn io_error(&self, err: &std::io::Error) -> FiggyError {
        if err.kind() == std::io::ErrorKind::NotFound {
            FiggyError::FileNotFound {
                id: self.id.clone(),
            }
        } else {
            FiggyError::io("read_file", err)
        }
    }
}

/// Blob store for files attached to resources
pub trait StorageAdapter: Send + Sync {
    /// Store the file at `file` for `resource` under `original_filename`
    fn upload(&self, file: &Path, original_filename: &str, resource: &Resource)
        -> Result<StoredFile>;

    fn find_by(&self, id: &FileId) -> Result<StoredFile>;

    fn delete(&self, id: &FileId) -> Result<()>;

    /// Whether `id` belongs to this adapter
    fn handles(&self, id: &FileId) -> bool;

    fn supports(&self, feature: &str) -> bool;

    /// Root directory for disk-backed adapters
    fn base_path(&self) -> Option<&Path> {
        None
    }
}
