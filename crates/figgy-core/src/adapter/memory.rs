//! In-memory metadata adapter
//!
//! Keeps resources in insertion order behind a mutex. Transactions snapshot
//! the whole state and restore it when the block fails, which gives nested
//! savepoint semantics for free. The `search_index` flavour accepts
//! externally persisted resources on every write, the way a document index
//! does.

use crate::adapter::{prepare_save, MetadataAdapter, Persister, QueryService, Transactional};
use crate::errors::{FiggyError, Result};
use crate::model::{Resource, MEMBER_IDS};
use figgy_core_types::ResourceId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    resources: Vec<Resource>,
    writes: usize,
}

impl MemoryState {
    fn position(&self, id: &ResourceId) -> Option<usize> {
        self.resources
            .iter()
            .position(|r| r.id.as_ref() == Some(id))
    }

    fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.position(id).map(|i| &self.resources[i])
    }

    fn upsert(&mut self, resource: Resource) {
        let existing = resource.id.as_ref().and_then(|id| self.position(id));
        match existing {
            Some(i) => self.resources[i] = resource,
            None => self.resources.push(resource),
        }
        self.writes += 1;
    }

    fn remove(&mut self, id: &ResourceId) {
        if let Some(i) = self.position(id) {
            self.resources.remove(i);
            self.writes += 1;
        }
    }
}

type SharedState = Arc<Mutex<MemoryState>>;

fn lock(state: &SharedState) -> Result<MutexGuard<'_, MemoryState>> {
    state.lock().map_err(|_| FiggyError::Internal {
        message: "memory adapter state poisoned".to_string(),
    })
}

/// Snapshot-based transaction scope over the memory state
struct MemoryConnection {
    state: SharedState,
    depth: AtomicUsize,
}

impl Transactional for MemoryConnection {
    fn transaction(&self, savepoint: bool, block: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        if !savepoint && self.depth.load(Ordering::SeqCst) > 0 {
            return block();
        }

        let snapshot = lock(&self.state)?.clone();
        self.depth.fetch_add(1, Ordering::SeqCst);
        let result = block();
        self.depth.fetch_sub(1, Ordering::SeqCst);

        if result.is_err() {
            *lock(&self.state)? = snapshot;
            tracing::debug!("memory transaction rolled back");
        }
        result
    }
}

struct MemoryPersister {
    state: SharedState,
    connection: Arc<MemoryConnection>,
    accepts_external: bool,
}

impl Persister for MemoryPersister {
    fn save(&self, resource: Resource, external_resource: bool) -> Result<Resource> {
        let mut state = lock(&self.state)?;
        let stored = resource.id.as_ref().and_then(|id| state.get(id)).cloned();
        let saved = prepare_save(
            resource,
            stored.as_ref(),
            external_resource || self.accepts_external,
        )?;
        state.upsert(saved.clone());
        Ok(saved)
    }

    fn delete(&self, resource: Resource) -> Result<Resource> {
        if let Some(id) = &resource.id {
            lock(&self.state)?.remove(id);
        }
        Ok(resource)
    }

    fn connection(&self) -> Option<Arc<dyn Transactional>> {
        Some(self.connection.clone())
    }
}

struct MemoryQueryService {
    state: SharedState,
}

impl MemoryQueryService {
    fn filtered<F>(&self, predicate: F) -> Result<Vec<Resource>>
    where
        F: Fn(&Resource) -> bool,
    {
        Ok(lock(&self.state)?
            .resources
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect())
    }

    fn resolve(&self, ids: &[ResourceId]) -> Result<Vec<Resource>> {
        let state = lock(&self.state)?;
        Ok(ids.iter().filter_map(|id| state.get(id)).cloned().collect())
    }
}

impl QueryService for MemoryQueryService {
    fn find_by(&self, id: &ResourceId) -> Result<Resource> {
        lock(&self.state)?
            .get(id)
            .cloned()
            .ok_or_else(|| FiggyError::ObjectNotFound { id: id.to_string() })
    }

    fn find_all(&self) -> Result<Vec<Resource>> {
        self.filtered(|_| true)
    }

    fn find_all_of_model(&self, model: &str) -> Result<Vec<Resource>> {
        self.filtered(|r| r.model == model)
    }

    fn find_members(&self, resource: &Resource) -> Result<Vec<Resource>> {
        self.resolve(&resource.member_ids())
    }

    fn find_parents(&self, resource: &Resource) -> Result<Vec<Resource>> {
        let Some(id) = &resource.id else {
            return Ok(Vec::new());
        };
        self.filtered(|r| r.references(MEMBER_IDS, id))
    }

    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Vec<Resource>> {
        self.resolve(&resource.reference_ids(property))
    }

    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>> {
        let id = resource.id.as_ref().ok_or_else(|| FiggyError::InvalidInput {
            reason: "inverse references need a saved resource".to_string(),
        })?;
        self.filtered(|r| r.references(property, id))
    }
}

/// In-memory metadata adapter
#[derive(Clone)]
pub struct MemoryAdapter {
    state: SharedState,
    persister: Arc<MemoryPersister>,
    query_service: Arc<MemoryQueryService>,
}

impl MemoryAdapter {
    /// A primary-store flavour: enforces the persisted-resource check
    pub fn new() -> Self {
        Self::build(false)
    }

    /// A secondary-index flavour: every write is treated as external
    pub fn search_index() -> Self {
        Self::build(true)
    }

    fn build(accepts_external: bool) -> Self {
        let state: SharedState = Arc::new(Mutex::new(MemoryState::default()));
        let connection = Arc::new(MemoryConnection {
            state: state.clone(),
            depth: AtomicUsize::new(0),
        });
        Self {
            persister: Arc::new(MemoryPersister {
                state: state.clone(),
                connection,
                accepts_external,
            }),
            query_service: Arc::new(MemoryQueryService {
                state: state.clone(),
            }),
            state,
        }
    }

    /// Number of successful writes (saves and deletes) since creation
    pub fn write_count(&self) -> usize {
        self.state.lock().map(|s| s.writes).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.resources.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataAdapter for MemoryAdapter {
    fn persister(&self) -> Arc<dyn Persister> {
        self.persister.clone()
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        self.query_service.clone()
    }
}
