//! Change-set persister: the ordered hook pipeline around saves and deletes
//!
//! A save runs, in order: every around-save handler's before hook,
//! `before_save` handlers, the underlying write, `after_save` handlers,
//! around-save after hooks, then queues `after_update_commit` (updates
//! only), `after_save_commit` and `after_commit`. A delete runs
//! `before_delete`, the underlying delete, then queues
//! `after_delete_commit`.
//!
//! Queued handlers run immediately on a plain persister. Inside
//! [`ChangeSetPersister::buffer_into_index`] they wait until the whole block
//! has committed.

use crate::adapter::{MetadataAdapter, QueryService};
use crate::errors::{FiggyError, Result};
use crate::handlers::{Handler, HandlerContext, HandlerRegistry, Phase};
use crate::model::{ChangeSet, Resource};
use crate::queue::{CallbackQueue, DelayedQueue, InstantQueue};
use crate::storage::StorageAdapter;
use crate::{log_op_end, log_op_error, log_op_start};
use std::sync::Arc;
use std::time::Instant;

/// Construction flags for [`ChangeSetPersister`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersisterOptions {
    /// Queue post-commit handlers instead of running them inline
    pub transaction: bool,
    /// Read by file handlers to decide whether to characterize uploads
    pub characterize: bool,
    /// Background queue name handed to handlers that enqueue jobs
    pub queue: String,
}

impl Default for PersisterOptions {
    fn default() -> Self {
        Self {
            transaction: false,
            characterize: true,
            queue: "default".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ChangeSetPersister {
    metadata_adapter: Arc<dyn MetadataAdapter>,
    storage_adapter: Arc<dyn StorageAdapter>,
    handlers: Arc<HandlerRegistry>,
    options: PersisterOptions,
    after_rollback: Arc<DelayedQueue>,
    delayed_queue: Arc<dyn CallbackQueue>,
}

impl ChangeSetPersister {
    pub fn new(
        metadata_adapter: Arc<dyn MetadataAdapter>,
        storage_adapter: Arc<dyn StorageAdapter>,
        handlers: Arc<HandlerRegistry>,
        options: PersisterOptions,
    ) -> Self {
        let delayed_queue: Arc<dyn CallbackQueue> = if options.transaction {
            Arc::new(DelayedQueue::new())
        } else {
            Arc::new(InstantQueue)
        };
        Self {
            metadata_adapter,
            storage_adapter,
            handlers,
            options,
            after_rollback: Arc::new(DelayedQueue::new()),
            delayed_queue,
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

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn is_transaction(&self) -> bool {
        self.options.transaction
    }

    pub fn characterize(&self) -> bool {
        self.options.characterize
    }

    pub fn queue_name(&self) -> &str {
        &self.options.queue
    }

    /// Compensating actions run if the enclosing buffered block fails
    ///
    /// Handlers push onto this queue; it is shared with every instance
    /// derived through [`with`](Self::with).
    pub fn after_rollback(&self) -> &Arc<DelayedQueue> {
        &self.after_rollback
    }

    /// Number of post-commit callbacks waiting on this instance
    pub fn pending_callbacks(&self) -> usize {
        self.delayed_queue.len()
    }

    /// Run post-commit callbacks queued on this instance
    ///
    /// Only meaningful for instances obtained from [`with`](Self::with);
    /// `buffer_into_index` flushes its own instance.
    pub fn run_deferred(&self) -> Result<()> {
        self.delayed_queue.run()
    }

    /// Save the change set's resource through the hook pipeline
    pub fn save(&self, change_set: &mut ChangeSet, external_resource: bool) -> Result<Resource> {
        let start = Instant::now();
        log_op_start!("save", model = %change_set.resource().model);

        let result = self.save_phases(change_set, external_resource);
        self.discard_late_compensations();
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(saved) => {
                log_op_end!(
                    "save",
                    duration_ms = duration_ms,
                    resource_id = %saved.id.as_ref().map(|id| id.as_str()).unwrap_or_default()
                );
            }
            Err(err) => log_op_error!("save", err.clone(), duration_ms = duration_ms),
        }
        result
    }

    fn save_phases(&self, change_set: &mut ChangeSet, external_resource: bool) -> Result<Resource> {
        let was_persisted = change_set.persisted();
        let updated = self.settle(self.write_phases(change_set, external_resource))?;

        if was_persisted {
            self.dispatch(Phase::AfterUpdateCommit, change_set, Some(&updated))?;
        }
        self.dispatch(Phase::AfterSaveCommit, change_set, Some(&updated))?;
        self.dispatch(Phase::AfterCommit, change_set, Some(&updated))?;

        Ok(updated)
    }

    /// Around hooks, immediate phases and the underlying write
    fn write_phases(&self, change_set: &mut ChangeSet, external_resource: bool) -> Result<Resource> {
        let mut around: Vec<_> = self
            .handlers
            .around_save_factories()
            .iter()
            .map(|factory| factory())
            .collect();
        for handler in around.iter_mut() {
            handler.run_before_save(&mut HandlerContext {
                change_set_persister: self,
                change_set: &mut *change_set,
                post_save_resource: None,
            })?;
        }

        self.dispatch(Phase::BeforeSave, change_set, None)?;

        change_set.sync();
        let updated = self
            .metadata_adapter
            .persister()
            .save(change_set.resource().clone(), external_resource)?;

        self.dispatch(Phase::AfterSave, change_set, Some(&updated))?;

        for handler in around.iter_mut() {
            handler.run_after_save(&mut HandlerContext {
                change_set_persister: self,
                change_set: &mut *change_set,
                post_save_resource: Some(&updated),
            })?;
        }

        Ok(updated)
    }

    /// Save each change set in order; not atomic across the list
    pub fn save_all(&self, change_sets: &mut [ChangeSet]) -> Result<Vec<Resource>> {
        let start = Instant::now();
        log_op_start!("save_all", count = change_sets.len());

        let result: Result<Vec<Resource>> = change_sets
            .iter_mut()
            .map(|change_set| self.save(change_set, false))
            .collect();
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(saved) => {
                log_op_end!("save_all", duration_ms = duration_ms, count = saved.len());
            }
            Err(err) => log_op_error!("save_all", err.clone(), duration_ms = duration_ms),
        }
        result
    }

    /// Delete the change set's resource through the hook pipeline
    pub fn delete(&self, change_set: &mut ChangeSet) -> Result<Resource> {
        let start = Instant::now();
        log_op_start!("delete", model = %change_set.resource().model);

        let result = self.delete_phases(change_set);
        self.discard_late_compensations();
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("delete", duration_ms = duration_ms);
            }
            Err(err) => log_op_error!("delete", err.clone(), duration_ms = duration_ms),
        }
        result
    }

    fn delete_phases(&self, change_set: &mut ChangeSet) -> Result<Resource> {
        let deleted = self.settle(
            self.dispatch(Phase::BeforeDelete, change_set, None)
                .and_then(|()| {
                    self.metadata_adapter
                        .persister()
                        .delete(change_set.resource().clone())
                }),
        )?;
        self.dispatch(Phase::AfterDeleteCommit, change_set, Some(&deleted))?;
        Ok(deleted)
    }

    /// Run `block` against a buffering instance of this persister
    ///
    /// Index writes made in the block are flushed once when it finishes and
    /// queued post-commit handlers fire only after that succeeds, in the
    /// order they were queued. If the block fails, `after_rollback` actions
    /// run, queued handlers are discarded, and the block's error is
    /// returned. An already-transactional persister hands itself to the
    /// block.
    pub fn buffer_into_index<T, F>(&self, block: F) -> Result<T>
    where
        F: FnOnce(&ChangeSetPersister) -> Result<T>,
    {
        if self.options.transaction {
            return block(self);
        }

        let start = Instant::now();
        log_op_start!("buffer_into_index");

        let after_rollback = Arc::new(DelayedQueue::new());
        let delayed_queue = Arc::new(DelayedQueue::new());
        let mut block = Some(block);
        let mut output = None;

        let buffered = self
            .metadata_adapter
            .buffer_into_index(&mut |staging: Arc<dyn MetadataAdapter>| -> Result<()> {
                let persister = self.derive(
                    staging,
                    self.storage_adapter.clone(),
                    after_rollback.clone(),
                    delayed_queue.clone(),
                );
                if let Some(block) = block.take() {
                    output = Some(block(&persister)?);
                }
                Ok(())
            });

        let result = match buffered {
            Ok(()) => {
                after_rollback.clear();
                delayed_queue.run().and_then(|()| {
                    output.ok_or_else(|| FiggyError::Internal {
                        message: "buffered block did not run".to_string(),
                    })
                })
            }
            Err(err) => {
                delayed_queue.clear();
                roll_back(&after_rollback);
                Err(err)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("buffer_into_index", duration_ms = duration_ms);
            }
            Err(err) => log_op_error!("buffer_into_index", err.clone(), duration_ms = duration_ms),
        }
        result
    }

    /// New transactional instance delegating to other adapters
    ///
    /// Shares the handler table and this instance's `after_rollback` queue
    /// and queues post-commit handlers until [`run_deferred`](Self::run_deferred).
    pub fn with(
        &self,
        metadata_adapter: Arc<dyn MetadataAdapter>,
        storage_adapter: Arc<dyn StorageAdapter>,
    ) -> ChangeSetPersister {
        self.derive(
            metadata_adapter,
            storage_adapter,
            self.after_rollback.clone(),
            Arc::new(DelayedQueue::new()),
        )
    }

    /// [`with`](Self::with), handing the new instance to `block`
    pub fn with_scope<T, F>(
        &self,
        metadata_adapter: Arc<dyn MetadataAdapter>,
        storage_adapter: Arc<dyn StorageAdapter>,
        block: F,
    ) -> Result<T>
    where
        F: FnOnce(&ChangeSetPersister) -> Result<T>,
    {
        block(&self.with(metadata_adapter, storage_adapter))
    }

    fn derive(
        &self,
        metadata_adapter: Arc<dyn MetadataAdapter>,
        storage_adapter: Arc<dyn StorageAdapter>,
        after_rollback: Arc<DelayedQueue>,
        delayed_queue: Arc<DelayedQueue>,
    ) -> ChangeSetPersister {
        ChangeSetPersister {
            metadata_adapter,
            storage_adapter,
            handlers: self.handlers.clone(),
            options: PersisterOptions {
                transaction: true,
                ..self.options.clone()
            },
            after_rollback,
            delayed_queue,
        }
    }

    /// Run `phase` inline, or hand it to the active queue once there is a
    /// stored resource to pass along
    fn dispatch(
        &self,
        phase: Phase,
        change_set: &mut ChangeSet,
        post_save_resource: Option<&Resource>,
    ) -> Result<()> {
        match post_save_resource {
            Some(resource) if phase.is_queued() => self.queue_phase(phase, change_set, resource),
            _ => self.run_phase(phase, change_set, post_save_resource),
        }
    }

    fn run_phase(
        &self,
        phase: Phase,
        change_set: &mut ChangeSet,
        post_save_resource: Option<&Resource>,
    ) -> Result<()> {
        let handlers = self.handlers.handlers(phase);
        if handlers.is_empty() {
            return Ok(());
        }
        tracing::debug!(phase = phase.as_str(), handler_count = handlers.len(), "running handlers");

        for handler in handlers {
            handler
                .run(&mut HandlerContext {
                    change_set_persister: self,
                    change_set: &mut *change_set,
                    post_save_resource,
                })
                .map_err(|err| {
                    tracing::debug!(
                        phase = phase.as_str(),
                        handler = handler.name(),
                        error = %err,
                        "handler failed"
                    );
                    err
                })?;
        }
        Ok(())
    }

    /// Hand every handler of `phase` to the active queue
    ///
    /// Each callback captures a snapshot of the change set and resource as
    /// they are now.
    fn queue_phase(&self, phase: Phase, change_set: &ChangeSet, resource: &Resource) -> Result<()> {
        let handlers = self.handlers.handlers(phase);
        if handlers.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            phase = phase.as_str(),
            handler_count = handlers.len(),
            deferred = self.options.transaction,
            "queueing handlers"
        );

        for handler in handlers {
            let handler: Arc<dyn Handler> = handler.clone();
            let persister = self.clone();
            let mut change_set = change_set.clone();
            let resource = resource.clone();
            self.delayed_queue.add(Box::new(move || {
                handler.run(&mut HandlerContext {
                    change_set_persister: &persister,
                    change_set: &mut change_set,
                    post_save_resource: Some(&resource),
                })
            }))?;
        }
        Ok(())
    }

    /// Resolve `after_rollback` for a standalone save or delete once the
    /// write and its immediate phases are done
    ///
    /// Queued phases run after this, so a failing post-commit handler never
    /// compensates a committed write. Inside a buffered block the block
    /// owner decides instead.
    fn settle<T>(&self, result: Result<T>) -> Result<T> {
        if self.options.transaction {
            return result;
        }
        match &result {
            Ok(_) => self.after_rollback.clear(),
            Err(_) => roll_back(&self.after_rollback),
        }
        result
    }

    /// Compensations pushed by inline post-commit handlers have nothing
    /// left to undo
    fn discard_late_compensations(&self) {
        if !self.options.transaction {
            self.after_rollback.clear();
        }
    }
}

fn roll_back(after_rollback: &DelayedQueue) {
    if after_rollback.is_empty() {
        return;
    }
    tracing::warn!(
        queue_len = after_rollback.len(),
        "running after_rollback actions"
    );
    for err in after_rollback.run_all() {
        tracing::warn!(error = %err, "after_rollback action failed");
    }
    after_rollback.clear();
}

impl std::fmt::Debug for ChangeSetPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSetPersister")
            .field("options", &self.options)
            .field("handlers", &self.handlers)
            .field("pending_callbacks", &self.delayed_queue.len())
            .finish()
    }
}
