use crate::model::Resource;
use figgy_core_types::ResourceId;
use serde_json::Value;
use std::collections::BTreeMap;

/// A validated, pending mutation bound to one resource
///
/// Callers `validate` incoming attributes, then hand the change set to a
/// change-set persister. Pending attributes are applied to the resource by
/// `sync`, which the persisters call right before writing.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    resource: Resource,
    pending: BTreeMap<String, Value>,
    required: Vec<String>,
    errors: Vec<String>,
}

impl ChangeSet {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            pending: BTreeMap::new(),
            required: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Declare attributes that must be present for `validate` to pass
    pub fn with_required(mut self, fields: &[&str]) -> Self {
        self.required = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut Resource {
        &mut self.resource
    }

    pub fn id(&self) -> Option<&ResourceId> {
        self.resource.id.as_ref()
    }

    pub fn persisted(&self) -> bool {
        self.resource.persisted()
    }

    /// Stage `attrs` and check required fields
    ///
    /// Returns `false` and records one error per missing (or null) required
    /// attribute. Staged values stay pending either way.
    pub fn validate<I, K>(&mut self, attrs: I) -> bool
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in attrs {
            self.pending.insert(key.into(), value);
        }

        self.errors.clear();
        for field in &self.required {
            let value = self
                .pending
                .get(field)
                .or_else(|| self.resource.attribute(field));
            if value.map_or(true, Value::is_null) {
                self.errors.push(format!("{} can't be blank", field));
            }
        }

        self.errors.is_empty()
    }

    /// Stage a single attribute without validating
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.pending.insert(key.into(), value.into());
    }

    /// Value as it will be after `sync`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pending
            .get(key)
            .or_else(|| self.resource.attribute(key))
    }

    pub fn is_changed(&self, key: &str) -> bool {
        self.pending
            .get(key)
            .is_some_and(|value| self.resource.attribute(key) != Some(value))
    }

    /// Apply pending attributes to the resource
    pub fn sync(&mut self) {
        for (key, value) in std::mem::take(&mut self.pending) {
            self.resource.set(key, value);
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

impl From<Resource> for ChangeSet {
    fn from(resource: Resource) -> Self {
        ChangeSet::new(resource)
    }
}
