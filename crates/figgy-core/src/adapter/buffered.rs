//! Staging persister used while buffering index writes
//!
//! Writes go straight through to the wrapped persister; the results are
//! mirrored into an in-memory log so that, once the buffered block ends,
//! the caller can push the net result into a secondary index in one go.

use crate::adapter::{Persister, Transactional};
use crate::errors::{FiggyError, Result};
use crate::model::Resource;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct StagingLog {
    staged: Vec<Resource>,
    deletes: Vec<Resource>,
}

pub struct BufferedPersister {
    inner: Arc<dyn Persister>,
    log: Mutex<StagingLog>,
}

impl BufferedPersister {
    pub fn new(inner: Arc<dyn Persister>) -> Self {
        Self {
            inner,
            log: Mutex::new(StagingLog::default()),
        }
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut StagingLog) -> T) -> Result<T> {
        let mut log = self.log.lock().map_err(|_| FiggyError::Internal {
            message: "staging log poisoned".to_string(),
        })?;
        Ok(f(&mut log))
    }

    /// Resources deleted during the block, first occurrence per id
    pub fn deletes(&self) -> Result<Vec<Resource>> {
        self.with_log(|log| {
            let mut seen = HashSet::new();
            log.deletes
                .iter()
                .filter(|r| seen.insert(r.id.clone()))
                .cloned()
                .collect()
        })
    }

    /// Current staged resources, in first-write order
    pub fn staged(&self) -> Result<Vec<Resource>> {
        self.with_log(|log| log.staged.clone())
    }

    fn stage(&self, resource: &Resource) -> Result<()> {
        self.with_log(|log| {
            match log.staged.iter_mut().find(|r| r.id == resource.id) {
                Some(existing) => *existing = resource.clone(),
                None => log.staged.push(resource.clone()),
            }
        })
    }
}

impl Persister for BufferedPersister {
    fn save(&self, resource: Resource, external_resource: bool) -> Result<Resource> {
        let saved = self.inner.save(resource, external_resource)?;
        self.stage(&saved)?;
        Ok(saved)
    }

    fn save_all(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        let saved = self.inner.save_all(resources)?;
        for resource in &saved {
            self.stage(resource)?;
        }
        Ok(saved)
    }

    fn delete(&self, resource: Resource) -> Result<Resource> {
        let deleted = self.inner.delete(resource)?;
        self.with_log(|log| {
            log.staged.retain(|r| r.id != deleted.id);
            log.deletes.push(deleted.clone());
        })?;
        Ok(deleted)
    }

    fn connection(&self) -> Option<Arc<dyn Transactional>> {
        self.inner.connection()
    }
}
