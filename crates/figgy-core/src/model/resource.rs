use chrono::{DateTime, Utc};
use figgy_core_types::ResourceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Membership property: ordered ids of member resources
pub const MEMBER_IDS: &str = "member_ids";

/// A persisted (or about to be persisted) domain object
///
/// The pipeline treats resources as opaque apart from `id`, `model` (used
/// for routing decisions such as index exclusion) and the optimistic lock
/// token. Everything else lives in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Option<ResourceId>,
    pub model: String,
    pub attributes: BTreeMap<String, Value>,
    /// Optimistic lock token; `None` disables locking for this resource
    pub lock_version: Option<u64>,
    pub new_record: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource {
    /// Create a new, unsaved resource of the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: None,
            model: model.into(),
            attributes: BTreeMap::new(),
            lock_version: None,
            new_record: true,
            created_at: None,
            updated_at: None,
        }
    }

    /// Pre-assign an id (e.g. for resources imported from another store)
    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Turn on optimistic locking for this resource
    pub fn with_optimistic_locking(mut self) -> Self {
        self.lock_version = Some(self.lock_version.unwrap_or(0));
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_member_ids(mut self, ids: &[ResourceId]) -> Self {
        self.set_reference_ids(MEMBER_IDS, ids);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Whether this resource already exists in a backend
    pub fn persisted(&self) -> bool {
        !self.new_record
    }

    /// Resource ids stored under `property`
    ///
    /// Accepts a single string id or an array of string ids; anything else
    /// yields no references.
    pub fn reference_ids(&self, property: &str) -> Vec<ResourceId> {
        match self.attributes.get(property) {
            Some(Value::String(id)) => vec![ResourceId::from(id.as_str())],
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(ResourceId::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_reference_ids(&mut self, property: &str, ids: &[ResourceId]) {
        let values = ids
            .iter()
            .map(|id| Value::String(id.as_str().to_string()))
            .collect();
        self.attributes
            .insert(property.to_string(), Value::Array(values));
    }

    pub fn member_ids(&self) -> Vec<ResourceId> {
        self.reference_ids(MEMBER_IDS)
    }

    /// Whether `property` references `id`
    pub fn references(&self, property: &str, id: &ResourceId) -> bool {
        self.reference_ids(property).iter().any(|r| r == id)
    }
}
