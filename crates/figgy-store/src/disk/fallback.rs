//! Read-through to an older repository
//!
//! Files that were never copied to the current repository are looked up in
//! the fallback under the same relative path. Callers always see the id
//! they asked for.

use crate::errors::Result;
use figgy_core::errors::FiggyError;
use figgy_core::storage::{StorageAdapter, StoredFile};
use figgy_core::Resource;
use figgy_core_types::FileId;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct FallbackDiskAdapter {
    primary: Arc<dyn StorageAdapter>,
    fallback: Arc<dyn StorageAdapter>,
    primary_base: PathBuf,
    fallback_base: PathBuf,
}

impl FallbackDiskAdapter {
    /// # Errors
    ///
    /// Returns `FiggyError::Config` unless both adapters are disk-backed.
    pub fn new(primary: Arc<dyn StorageAdapter>, fallback: Arc<dyn StorageAdapter>) -> Result<Self> {
        let base_of = |adapter: &Arc<dyn StorageAdapter>, role: &str| {
            adapter
                .base_path()
                .map(Path::to_path_buf)
                .ok_or_else(|| FiggyError::Config {
                    message: format!("{} storage for the fallback adapter has no base path", role),
                })
        };
        let primary_base = base_of(&primary, "primary")?;
        let fallback_base = base_of(&fallback, "fallback")?;

        Ok(Self {
            primary,
            fallback,
            primary_base,
            fallback_base,
        })
    }

    /// `id` with the primary base path swapped for the fallback's
    pub fn fallback_id(&self, id: &FileId) -> FileId {
        match Path::new(id.location()).strip_prefix(&self.primary_base) {
            Ok(relative) => FileId::new(format!(
                "{}://{}",
                id.scheme().unwrap_or(crate::disk::SCHEME),
                self.fallback_base.join(relative).display()
            )),
            Err(_) => id.clone(),
        }
    }
}

impl StorageAdapter for FallbackDiskAdapter {
    fn upload(
        &self,
        file: &Path,
        original_filename: &str,
        resource: &Resource,
    ) -> Result<StoredFile> {
        self.primary.upload(file, original_filename, resource)
    }

    fn find_by(&self, id: &FileId) -> Result<StoredFile> {
        match self.primary.find_by(id) {
            Err(FiggyError::FileNotFound { .. }) => {}
            other => return other,
        }

        let fallback_id = self.fallback_id(id);
        match self.fallback.find_by(&fallback_id) {
            Ok(file) => {
                tracing::warn!(
                    file_id = %id,
                    fallback_id = %fallback_id,
                    "file served from fallback storage"
                );
                Ok(file.with_id(id.clone()))
            }
            Err(FiggyError::FileNotFound { .. }) => {
                Err(FiggyError::FileNotFound { id: id.clone() })
            }
            Err(err) => Err(err),
        }
    }

    fn delete(&self, id: &FileId) -> Result<()> {
        self.primary.delete(id)
    }

    fn handles(&self, id: &FileId) -> bool {
        self.primary.handles(id)
    }

    fn supports(&self, feature: &str) -> bool {
        self.primary.supports(feature)
    }

    fn base_path(&self) -> Option<&Path> {
        Some(&self.primary_base)
    }
}
