//! Metadata adapter contracts and the decorators layered on them
//!
//! A metadata adapter pairs a [`Persister`] (writes) with a [`QueryService`]
//! (reads). Backends that can roll back expose a [`Transactional`]
//! connection through [`Persister::connection`]; the composite and
//! buffering layers look for it explicitly instead of assuming one.

pub mod buffered;
pub mod composite;
pub mod indexing;
pub mod instrumented;
pub mod memory;
pub mod read_only;

pub use buffered::BufferedPersister;
pub use composite::TransactionCompositePersister;
pub use indexing::IndexingAdapter;
pub use instrumented::InstrumentedAdapter;
pub use memory::MemoryAdapter;
pub use read_only::ReadOnlyAdapter;

use crate::errors::{FiggyError, Result};
use crate::model::Resource;
use chrono::Utc;
use figgy_core_types::ResourceId;
use std::sync::Arc;

/// Write side of a metadata backend
pub trait Persister: Send + Sync {
    /// Persist `resource`, returning the stored copy
    ///
    /// `external_resource` allows saving a resource that claims to be
    /// persisted but is absent here (it was persisted somewhere else).
    fn save(&self, resource: Resource, external_resource: bool) -> Result<Resource>;

    fn save_all(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        resources
            .into_iter()
            .map(|resource| self.save(resource, false))
            .collect()
    }

    fn delete(&self, resource: Resource) -> Result<Resource>;

    /// Transaction capability of the underlying connection, if any
    fn connection(&self) -> Option<Arc<dyn Transactional>> {
        None
    }
}

/// Read side of a metadata backend
pub trait QueryService: Send + Sync {
    fn find_by(&self, id: &ResourceId) -> Result<Resource>;

    fn find_all(&self) -> Result<Vec<Resource>>;

    fn find_all_of_model(&self, model: &str) -> Result<Vec<Resource>>;

    /// Members in `member_ids` order; ids that no longer resolve are skipped
    fn find_members(&self, resource: &Resource) -> Result<Vec<Resource>>;

    /// Resources listing `resource` in their `member_ids`
    fn find_parents(&self, resource: &Resource) -> Result<Vec<Resource>>;

    /// Resources referenced by `resource` through `property`
    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Vec<Resource>>;

    /// Resources whose `property` references `resource`
    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>>;
}

/// Scoped transaction with guaranteed rollback when the block fails
pub trait Transactional: Send + Sync {
    /// Run `block` inside a transaction
    ///
    /// With `savepoint` the block gets its own nested scope; without it, a
    /// block started inside an open transaction joins the outer one. If the
    /// block returns an error, everything it wrote is rolled back and the
    /// error is returned unchanged.
    fn transaction(&self, savepoint: bool, block: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Callback handed a staging adapter by [`MetadataAdapter::buffer_into_index`]
pub type BufferBlock<'a> = dyn FnMut(Arc<dyn MetadataAdapter>) -> Result<()> + 'a;

/// A persistence backend: persister plus query service
pub trait MetadataAdapter: Send + Sync {
    fn persister(&self) -> Arc<dyn Persister>;

    fn query_service(&self) -> Arc<dyn QueryService>;

    /// Run `block` against a staging adapter whose secondary-index writes
    /// are deferred until the block finishes
    ///
    /// Adapters without a secondary index just run the block inside a
    /// savepoint (when their persister is transactional) against a container
    /// over their own persister and query service.
    fn buffer_into_index(&self, block: &mut BufferBlock<'_>) -> Result<()> {
        let persister = self.persister();
        let staging: Arc<dyn MetadataAdapter> = Arc::new(AdapterContainer::new(
            persister.clone(),
            self.query_service(),
        ));
        in_transaction(persister.connection(), true, || block(staging.clone()))
    }
}

/// Plain pairing of a persister and a query service
pub struct AdapterContainer {
    persister: Arc<dyn Persister>,
    query_service: Arc<dyn QueryService>,
}

impl AdapterContainer {
    pub fn new(persister: Arc<dyn Persister>, query_service: Arc<dyn QueryService>) -> Self {
        Self {
            persister,
            query_service,
        }
    }
}

impl MetadataAdapter for AdapterContainer {
    fn persister(&self) -> Arc<dyn Persister> {
        self.persister.clone()
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        self.query_service.clone()
    }
}

/// Run `f` inside a transaction on `connection`, or directly when there is none
///
/// Without a transactional connection the work is best-effort and
/// non-atomic.
pub fn in_transaction<T, F>(
    connection: Option<Arc<dyn Transactional>>,
    savepoint: bool,
    f: F,
) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let Some(connection) = connection else {
        return f();
    };

    let mut f = Some(f);
    let mut output = None;
    connection.transaction(savepoint, &mut || {
        if let Some(f) = f.take() {
            output = Some(f()?);
        }
        Ok(())
    })?;

    output.ok_or_else(|| FiggyError::Internal {
        message: "transaction completed without running its block".to_string(),
    })
}

/// Apply the shared save rules to `resource` before it is written
///
/// `stored` is the backend's current copy under the same id, if any.
///
/// - a resource claiming to be persisted must exist unless `external_resource`
/// - a locked resource must carry the stored lock version, which is bumped
/// - new resources get an id; `new_record` flips; timestamps are stamped
pub fn prepare_save(
    mut resource: Resource,
    stored: Option<&Resource>,
    external_resource: bool,
) -> Result<Resource> {
    if resource.persisted() && stored.is_none() && !external_resource {
        return Err(FiggyError::ObjectNotFound {
            id: resource
                .id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_default(),
        });
    }

    if let Some(expected) = resource.lock_version {
        let actual = stored.and_then(|s| s.lock_version);
        if let Some(actual) = actual {
            if actual != expected {
                return Err(FiggyError::StaleObject {
                    id: resource.id.clone().unwrap_or_else(|| ResourceId::from("")),
                    expected: Some(expected),
                    actual: Some(actual),
                });
            }
        }
        resource.lock_version = Some(actual.unwrap_or(expected) + 1);
    }

    let now = Utc::now();
    if resource.id.is_none() {
        resource.id = Some(ResourceId::generate());
    }
    resource.created_at = stored
        .and_then(|s| s.created_at)
        .or(resource.created_at)
        .or(Some(now));
    resource.updated_at = Some(now);
    resource.new_record = false;

    Ok(resource)
}
