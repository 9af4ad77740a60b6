//! Upload retry on transient I/O errors
//!
//! Network mounts under the repository occasionally fail a write with
//! `EPIPE`, `EAGAIN` or `EIO`; the same upload usually succeeds when
//! repeated straight away. Only `upload` is retried.

use crate::errors::Result;
use figgy_core::storage::{StorageAdapter, StoredFile};
use figgy_core::Resource;
use figgy_core_types::FileId;
use std::path::Path;
use std::sync::Arc;

/// Total upload attempts, the first included
pub const DEFAULT_UPLOAD_ATTEMPTS: u32 = 5;

pub struct RetryingDiskAdapter {
    inner: Arc<dyn StorageAdapter>,
    max_attempts: u32,
}

impl RetryingDiskAdapter {
    pub fn new(inner: Arc<dyn StorageAdapter>) -> Self {
        Self {
            inner,
            max_attempts: DEFAULT_UPLOAD_ATTEMPTS,
        }
    }

    /// Values below 1 are treated as 1
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl StorageAdapter for RetryingDiskAdapter {
    fn upload(
        &self,
        file: &Path,
        original_filename: &str,
        resource: &Resource,
    ) -> Result<StoredFile> {
        let mut attempt = 0;
        loop {
            match self.inner.upload(file, original_filename, resource) {
                Ok(stored) => return Ok(stored),
                Err(err) if err.is_transient_io() && attempt + 1 < self.max_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient upload failure, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn find_by(&self, id: &FileId) -> Result<StoredFile> {
        self.inner.find_by(id)
    }

    fn delete(&self, id: &FileId) -> Result<()> {
        self.inner.delete(id)
    }

    fn handles(&self, id: &FileId) -> bool {
        self.inner.handles(id)
    }

    fn supports(&self, feature: &str) -> bool {
        self.inner.supports(feature)
    }

    fn base_path(&self) -> Option<&Path> {
        self.inner.base_path()
    }
}
