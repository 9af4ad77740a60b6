//! Fan-out persister writing to a primary and any number of secondaries
//!
//! Writes run inside a transaction on the primary's connection when it has
//! one, so a failing secondary rolls the primary write back too. Without a
//! transactional primary the fan-out is best-effort.

use crate::adapter::{in_transaction, Persister, Transactional};
use crate::errors::{FiggyError, Result};
use crate::model::Resource;
use std::sync::Arc;

pub struct TransactionCompositePersister {
    persisters: Vec<Arc<dyn Persister>>,
}

impl TransactionCompositePersister {
    /// The first persister is the primary
    pub fn new(persisters: Vec<Arc<dyn Persister>>) -> Self {
        Self { persisters }
    }

    fn primary(&self) -> Result<&Arc<dyn Persister>> {
        self.persisters.first().ok_or_else(|| FiggyError::Internal {
            message: "composite persister has no persisters".to_string(),
        })
    }

    fn save_to_all(&self, resource: Resource, external_resource: bool) -> Result<Resource> {
        let mut output = self.primary()?.save(resource, external_resource)?;
        for persister in self.persisters.iter().skip(1) {
            output = persister.save(output, true)?;
        }
        Ok(output)
    }
}

impl Persister for TransactionCompositePersister {
    fn save(&self, resource: Resource, external_resource: bool) -> Result<Resource> {
        in_transaction(self.connection(), true, || {
            self.save_to_all(resource, external_resource)
        })
    }

    fn save_all(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        in_transaction(self.connection(), true, || {
            let mut output = self.primary()?.save_all(resources)?;
            for persister in self.persisters.iter().skip(1) {
                output = persister.save_all(output)?;
            }
            Ok(output)
        })
    }

    fn delete(&self, resource: Resource) -> Result<Resource> {
        in_transaction(self.connection(), true, || {
            let mut output = resource;
            for persister in &self.persisters {
                output = persister.delete(output)?;
            }
            Ok(output)
        })
    }

    fn connection(&self) -> Option<Arc<dyn Transactional>> {
        self.persisters.first().and_then(|p| p.connection())
    }
}
