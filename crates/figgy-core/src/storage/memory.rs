//! In-memory storage adapter, ids of the form `memory://<resource>/<name>`

use crate::errors::{FiggyError, Result};
use crate::model::Resource;
use crate::storage::{StorageAdapter, StoredFile};
use figgy_core_types::FileId;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEME: &str = "memory";

#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<FileId, Arc<[u8]>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> Result<std::sync::MutexGuard<'_, HashMap<FileId, Arc<[u8]>>>> {
        self.files.lock().map_err(|_| FiggyError::Internal {
            message: "memory storage poisoned".to_string(),
        })
    }
}

impl StorageAdapter for MemoryStorage {
    fn upload(
        &self,
        file: &Path,
        original_filename: &str,
        resource: &Resource,
    ) -> Result<StoredFile> {
        let bytes: Arc<[u8]> = std::fs::read(file)
            .map_err(|e| FiggyError::io("upload", &e))?
            .into();
        let owner = resource
            .id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unassigned".to_string());
        let id = FileId::new(format!("{}://{}/{}", SCHEME, owner, original_filename));

        self.files()?.insert(id.clone(), bytes.clone());
        Ok(StoredFile::in_memory(id, bytes))
    }

    fn find_by(&self, id: &FileId) -> Result<StoredFile> {
        self.files()?
            .get(id)
            .cloned()
            .map(|bytes| StoredFile::in_memory(id.clone(), bytes))
            .ok_or_else(|| FiggyError::FileNotFound { id: id.clone() })
    }

    fn delete(&self, id: &FileId) -> Result<()> {
        self.files()?.remove(id);
        Ok(())
    }

    fn handles(&self, id: &FileId) -> bool {
        id.scheme() == Some(SCHEME)
    }

    fn supports(&self, _feature: &str) -> bool {
        false
    }
}
