//! Narrow change-set persister used by the Plum ingest path
//!
//! Phases: `before_save`, `after_save`, `before_delete` and `after_commit`.
//! There is no around hook, no update-only phase and no rollback queue.
//! `after_commit` handlers receive the file sets created since the last
//! commit instead of a change set.

use crate::adapter::{MetadataAdapter, QueryService};
use crate::errors::{FiggyError, Result};
use crate::handlers::{Handler, HandlerContext};
use crate::model::{ChangeSet, Resource};
use crate::storage::StorageAdapter;
use crate::{log_op_end, log_op_error, log_op_start};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Handler invoked once per commit with the newly created file sets
pub trait CommitHandler: Send + Sync {
    fn run(&self, persister: &PlumChangeSetPersister, created_file_sets: &[Resource])
        -> Result<()>;
}

impl<F> CommitHandler for F
where
    F: Fn(&PlumChangeSetPersister, &[Resource]) -> Result<()> + Send + Sync,
{
    fn run(
        &self,
        persister: &PlumChangeSetPersister,
        created_file_sets: &[Resource],
    ) -> Result<()> {
        self(persister, created_file_sets)
    }
}

type PlumHandler = Arc<dyn Handler<PlumChangeSetPersister>>;

/// Handler table for [`PlumChangeSetPersister`]
#[derive(Clone, Default)]
pub struct PlumHandlers {
    before_save: Vec<PlumHandler>,
    after_save: Vec<PlumHandler>,
    before_delete: Vec<PlumHandler>,
    after_commit: Vec<Arc<dyn CommitHandler>>,
}

impl PlumHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_save<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_, PlumChangeSetPersister>) -> Result<()> + Send + Sync + 'static,
    {
        self.before_save.push(Arc::new(handler));
        self
    }

    pub fn after_save<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_, PlumChangeSetPersister>) -> Result<()> + Send + Sync + 'static,
    {
        self.after_save.push(Arc::new(handler));
        self
    }

    pub fn before_delete<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_, PlumChangeSetPersister>) -> Result<()> + Send + Sync + 'static,
    {
        self.before_delete.push(Arc::new(handler));
        self
    }

    pub fn after_commit<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PlumChangeSetPersister, &[Resource]) -> Result<()> + Send + Sync + 'static,
    {
        self.after_commit.push(Arc::new(handler));
        self
    }
}

#[derive(Clone)]
pub struct PlumChangeSetPersister {
    metadata_adapter: Arc<dyn MetadataAdapter>,
    storage_adapter: Arc<dyn StorageAdapter>,
    handlers: Arc<PlumHandlers>,
    transaction: bool,
    characterize: bool,
    created_file_sets: Arc<Mutex<Vec<Resource>>>,
}

impl PlumChangeSetPersister {
    pub fn new(
        metadata_adapter: Arc<dyn MetadataAdapter>,
        storage_adapter: Arc<dyn StorageAdapter>,
        handlers: Arc<PlumHandlers>,
        characterize: bool,
    ) -> Self {
        Self {
            metadata_adapter,
            storage_adapter,
            handlers,
            transaction: false,
            characterize,
            created_file_sets: Arc::default(),
        }
    }

    pub fn metadata_adapter(&self) -> &Arc<dyn MetadataAdapter> {
        &self.metadata_adapter
    }

    pub fn storage_adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage_adapter
    }

    pub fn query_service(&self) -> Arc<dyn QueryService> {
        self.metadata_adapter.query_service()
    }

    pub fn is_transaction(&self) -> bool {
        self.transaction
    }

    pub fn characterize(&self) -> bool {
        self.characterize
    }

    /// Record a file set created by a handler during this commit
    pub fn track_created_file_set(&self, file_set: Resource) -> Result<()> {
        self.created_file_sets
            .lock()
            .map(|mut sets| sets.push(file_set))
            .map_err(|_| FiggyError::Internal {
                message: "created file set list poisoned".to_string(),
            })
    }

    pub fn created_file_sets(&self) -> Vec<Resource> {
        self.created_file_sets
            .lock()
            .map(|sets| sets.clone())
            .unwrap_or_default()
    }

    pub fn save(&self, change_set: &mut ChangeSet, external_resource: bool) -> Result<Resource> {
        let start = Instant::now();
        log_op_start!("plum.save", model = %change_set.resource().model);

        let result = self.save_phases(change_set, external_resource);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("plum.save", duration_ms = duration_ms);
            }
            Err(err) => log_op_error!("plum.save", err.clone(), duration_ms = duration_ms),
        }
        result
    }

    fn save_phases(&self, change_set: &mut ChangeSet, external_resource: bool) -> Result<Resource> {
        self.run_phase(&self.handlers.before_save, change_set, None)?;
        change_set.sync();
        let updated = self
            .metadata_adapter
            .persister()
            .save(change_set.resource().clone(), external_resource)?;
        self.run_phase(&self.handlers.after_save, change_set, Some(&updated))?;
        if !self.transaction {
            self.commit()?;
        }
        Ok(updated)
    }

    pub fn save_all(&self, change_sets: &mut [ChangeSet]) -> Result<Vec<Resource>> {
        change_sets
            .iter_mut()
            .map(|change_set| self.save(change_set, false))
            .collect()
    }

    pub fn delete(&self, change_set: &mut ChangeSet) -> Result<Resource> {
        let start = Instant::now();
        log_op_start!("plum.delete", model = %change_set.resource().model);

        let result = self.delete_phases(change_set);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("plum.delete", duration_ms = duration_ms);
            }
            Err(err) => log_op_error!("plum.delete", err.clone(), duration_ms = duration_ms),
        }
        result
    }

    fn delete_phases(&self, change_set: &mut ChangeSet) -> Result<Resource> {
        self.run_phase(&self.handlers.before_delete, change_set, None)?;
        let deleted = self
            .metadata_adapter
            .persister()
            .delete(change_set.resource().clone())?;
        if !self.transaction {
            self.commit()?;
        }
        Ok(deleted)
    }

    /// Run `block` against a buffering instance, then fire `after_commit`
    /// once with every file set created inside it
    ///
    /// Nothing fires if the block or the index flush fails.
    pub fn buffer_into_index<T, F>(&self, block: F) -> Result<T>
    where
        F: FnOnce(&PlumChangeSetPersister) -> Result<T>,
    {
        if self.transaction {
            return block(self);
        }

        let mut block = Some(block);
        let mut output = None;
        let mut created = Vec::new();
        self.metadata_adapter
            .buffer_into_index(&mut |staging: Arc<dyn MetadataAdapter>| -> Result<()> {
                let buffered = self.with(staging);
                if let Some(block) = block.take() {
                    output = Some(block(&buffered)?);
                }
                created = buffered.created_file_sets();
                Ok(())
            })?;

        self.run_after_commit(&created)?;
        output.ok_or_else(|| FiggyError::Internal {
            message: "buffered block did not run".to_string(),
        })
    }

    /// Transactional instance over another metadata adapter
    pub fn with(&self, metadata_adapter: Arc<dyn MetadataAdapter>) -> PlumChangeSetPersister {
        PlumChangeSetPersister {
            metadata_adapter,
            storage_adapter: self.storage_adapter.clone(),
            handlers: self.handlers.clone(),
            transaction: true,
            characterize: self.characterize,
            created_file_sets: Arc::default(),
        }
    }

    fn commit(&self) -> Result<()> {
        let created = self
            .created_file_sets
            .lock()
            .map(|mut sets| std::mem::take(&mut *sets))
            .map_err(|_| FiggyError::Internal {
                message: "created file set list poisoned".to_string(),
            })?;
        self.run_after_commit(&created)
    }

    fn run_after_commit(&self, created: &[Resource]) -> Result<()> {
        if self.handlers.after_commit.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            handler_count = self.handlers.after_commit.len(),
            created_file_sets = created.len(),
            "running after_commit handlers"
        );
        for handler in &self.handlers.after_commit {
            handler.run(self, created)?;
        }
        Ok(())
    }

    fn run_phase(
        &self,
        handlers: &[PlumHandler],
        change_set: &mut ChangeSet,
        post_save_resource: Option<&Resource>,
    ) -> Result<()> {
        for handler in handlers {
            handler.run(&mut HandlerContext {
                change_set_persister: self,
                change_set: &mut *change_set,
                post_save_resource,
            })?;
        }
        Ok(())
    }
}
