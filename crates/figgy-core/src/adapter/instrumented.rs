//! Tracing wrapper around a metadata adapter
//!
//! Every persister and query call runs inside a `metadata.*` span tagged
//! with the resource id and model. Return values and errors are passed
//! through untouched.

use crate::adapter::{BufferBlock, MetadataAdapter, Persister, QueryService, Transactional};
use crate::errors::Result;
use crate::model::Resource;
use figgy_core_types::ResourceId;
use std::sync::Arc;
use tracing::info_span;

#[derive(Clone)]
pub struct InstrumentedAdapter {
    inner: Arc<dyn MetadataAdapter>,
}

impl InstrumentedAdapter {
    pub fn new(inner: Arc<dyn MetadataAdapter>) -> Self {
        Self { inner }
    }
}

fn id_tag(resource: &Resource) -> String {
    resource
        .id
        .as_ref()
        .map(ResourceId::to_string)
        .unwrap_or_default()
}

impl MetadataAdapter for InstrumentedAdapter {
    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(InstrumentedPersister {
            inner: self.inner.persister(),
        })
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(InstrumentedQueryService {
            inner: self.inner.query_service(),
        })
    }

    fn buffer_into_index(&self, block: &mut BufferBlock<'_>) -> Result<()> {
        let _span = info_span!("metadata.buffer_into_index").entered();
        self.inner
            .buffer_into_index(&mut |staging: Arc<dyn MetadataAdapter>| -> Result<()> {
                let staging: Arc<dyn MetadataAdapter> =
                    Arc::new(InstrumentedAdapter::new(staging));
                block(staging)
            })
    }
}

struct InstrumentedPersister {
    inner: Arc<dyn Persister>,
}

impl Persister for InstrumentedPersister {
    fn save(&self, resource: Resource, external_resource: bool) -> Result<Resource> {
        let _span = info_span!(
            "metadata.save",
            resource.id = %id_tag(&resource),
            resource.model = %resource.model,
            external_resource,
        )
        .entered();
        self.inner.save(resource, external_resource)
    }

    fn save_all(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        let _span = info_span!("metadata.save_all", count = resources.len()).entered();
        self.inner.save_all(resources)
    }

    fn delete(&self, resource: Resource) -> Result<Resource> {
        let _span = info_span!(
            "metadata.delete",
            resource.id = %id_tag(&resource),
            resource.model = %resource.model,
        )
        .entered();
        self.inner.delete(resource)
    }

    fn connection(&self) -> Option<Arc<dyn Transactional>> {
        self.inner.connection()
    }
}

struct InstrumentedQueryService {
    inner: Arc<dyn QueryService>,
}

impl QueryService for InstrumentedQueryService {
    fn find_by(&self, id: &ResourceId) -> Result<Resource> {
        let _span = info_span!("metadata.find_by_id", resource.id = %id).entered();
        self.inner.find_by(id)
    }

    fn find_all(&self) -> Result<Vec<Resource>> {
        let _span = info_span!("metadata.find_all").entered();
        self.inner.find_all()
    }

    fn find_all_of_model(&self, model: &str) -> Result<Vec<Resource>> {
        let _span = info_span!("metadata.find_all_of_model", resource.model = model).entered();
        self.inner.find_all_of_model(model)
    }

    fn find_members(&self, resource: &Resource) -> Result<Vec<Resource>> {
        let _span = info_span!(
            "metadata.find_members",
            resource.id = %id_tag(resource),
            resource.model = %resource.model,
        )
        .entered();
        self.inner.find_members(resource)
    }

    fn find_parents(&self, resource: &Resource) -> Result<Vec<Resource>> {
        let _span = info_span!(
            "metadata.find_parents",
            resource.id = %id_tag(resource),
            resource.model = %resource.model,
        )
        .entered();
        self.inner.find_parents(resource)
    }

    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Vec<Resource>> {
        let _span = info_span!(
            "metadata.find_references_by",
            resource.id = %id_tag(resource),
            resource.model = %resource.model,
            property,
        )
        .entered();
        self.inner.find_references_by(resource, property)
    }

    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>> {
        let _span = info_span!(
            "metadata.find_inverse_references_by",
            resource.id = %id_tag(resource),
            resource.model = %resource.model,
            property,
        )
        .entered();
        self.inner.find_inverse_references_by(resource, property)
    }
}
