//! Dual-write adapter over a primary store and a secondary search index
//!
//! Resources whose model is listed in `no_index_models` never reach the
//! index through `save`. `buffer_into_index` stages a block of writes and
//! pushes the net result into the index once, inside the primary's
//! savepoint so a failed flush also rolls the primary back.

use crate::adapter::{
    in_transaction, AdapterContainer, BufferBlock, BufferedPersister, MetadataAdapter, Persister,
    QueryService, TransactionCompositePersister, Transactional,
};
use crate::errors::Result;
use crate::model::Resource;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct IndexingAdapter {
    metadata_adapter: Arc<dyn MetadataAdapter>,
    index_adapter: Arc<dyn MetadataAdapter>,
    no_index_models: Arc<HashSet<String>>,
}

impl IndexingAdapter {
    pub fn new(
        metadata_adapter: Arc<dyn MetadataAdapter>,
        index_adapter: Arc<dyn MetadataAdapter>,
    ) -> Self {
        Self {
            metadata_adapter,
            index_adapter,
            no_index_models: Arc::new(HashSet::new()),
        }
    }

    pub fn with_no_index_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.no_index_models = Arc::new(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn metadata_adapter(&self) -> &Arc<dyn MetadataAdapter> {
        &self.metadata_adapter
    }

    pub fn index_adapter(&self) -> &Arc<dyn MetadataAdapter> {
        &self.index_adapter
    }

    pub fn is_indexed(&self, resource: &Resource) -> bool {
        !self.no_index_models.contains(&resource.model)
    }

    fn flush(&self, buffered: &BufferedPersister) -> Result<()> {
        let index = self.index_adapter.persister();

        let deletes = buffered.deletes()?;
        for resource in deletes.iter().cloned() {
            index.delete(resource)?;
        }

        let staged: Vec<Resource> = buffered
            .staged()?
            .into_iter()
            .filter(|r| self.is_indexed(r))
            .collect();
        let staged_count = staged.len();
        if !staged.is_empty() {
            index.save_all(staged)?;
        }

        tracing::debug!(
            deletes = deletes.len(),
            staged = staged_count,
            "flushed buffered writes into index"
        );
        Ok(())
    }
}

impl MetadataAdapter for IndexingAdapter {
    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(IndexingPersister {
            adapter: self.clone(),
            composite: TransactionCompositePersister::new(vec![
                self.metadata_adapter.persister(),
                self.index_adapter.persister(),
            ]),
        })
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        self.metadata_adapter.query_service()
    }

    fn buffer_into_index(&self, block: &mut BufferBlock<'_>) -> Result<()> {
        let primary = self.metadata_adapter.persister();
        let buffered = Arc::new(BufferedPersister::new(primary.clone()));
        let staging: Arc<dyn MetadataAdapter> = Arc::new(AdapterContainer::new(
            buffered.clone(),
            self.metadata_adapter.query_service(),
        ));

        in_transaction(primary.connection(), true, || {
            block(staging.clone())?;
            self.flush(&buffered)
        })
    }
}

/// Persister routing writes to the primary alone or to primary plus index
struct IndexingPersister {
    adapter: IndexingAdapter,
    composite: TransactionCompositePersister,
}

impl Persister for IndexingPersister {
    fn save(&self, resource: Resource, external_resource: bool) -> Result<Resource> {
        if self.adapter.is_indexed(&resource) {
            self.composite.save(resource, external_resource)
        } else {
            self.adapter
                .metadata_adapter
                .persister()
                .save(resource, external_resource)
        }
    }

    // Excluded models are not filtered here, only in `save`.
    fn save_all(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        self.composite.save_all(resources)
    }

    fn delete(&self, resource: Resource) -> Result<Resource> {
        self.composite.delete(resource)
    }

    fn connection(&self) -> Option<Arc<dyn Transactional>> {
        self.composite.connection()
    }
}
