//! Read-only wrapper: queries pass through, every write is refused

use crate::adapter::{MetadataAdapter, Persister, QueryService};
use crate::errors::{FiggyError, Result};
use crate::model::Resource;
use std::sync::Arc;

#[derive(Clone)]
pub struct ReadOnlyAdapter {
    inner: Arc<dyn MetadataAdapter>,
}

impl ReadOnlyAdapter {
    pub fn new(inner: Arc<dyn MetadataAdapter>) -> Self {
        Self { inner }
    }
}

impl MetadataAdapter for ReadOnlyAdapter {
    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(ReadOnlyPersister)
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        self.inner.query_service()
    }
}

struct ReadOnlyPersister;

fn refuse<T>(op: &str) -> Result<T> {
    tracing::warn!(op, "write refused by read-only adapter");
    Err(FiggyError::ReadOnly { op: op.to_string() })
}

impl Persister for ReadOnlyPersister {
    fn save(&self, _resource: Resource, _external_resource: bool) -> Result<Resource> {
        refuse("save")
    }

    fn save_all(&self, _resources: Vec<Resource>) -> Result<Vec<Resource>> {
        refuse("save_all")
    }

    fn delete(&self, _resource: Resource) -> Result<Resource> {
        refuse("delete")
    }
}
