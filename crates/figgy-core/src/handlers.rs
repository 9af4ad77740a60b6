//! Lifecycle handlers and the per-phase registry
//!
//! Business rules plug into a change-set persister as handlers registered
//! against a [`Phase`]. Within a phase, handlers run strictly in
//! registration order; later handlers may rely on changes made by earlier
//! ones (e.g. an identifier minted by one handler and read by the next).

use crate::change_set_persister::ChangeSetPersister;
use crate::errors::Result;
use crate::model::{ChangeSet, Resource};
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle phase a handler is registered against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    BeforeSave,
    AfterSave,
    /// Queued; only for change sets that were persisted before the save
    AfterUpdateCommit,
    /// Queued
    AfterSaveCommit,
    /// Queued
    AfterCommit,
    BeforeDelete,
    /// Queued
    AfterDeleteCommit,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BeforeSave => "before_save",
            Phase::AfterSave => "after_save",
            Phase::AfterUpdateCommit => "after_update_commit",
            Phase::AfterSaveCommit => "after_save_commit",
            Phase::AfterCommit => "after_commit",
            Phase::BeforeDelete => "before_delete",
            Phase::AfterDeleteCommit => "after_delete_commit",
        }
    }

    /// Whether handlers of this phase go through the persister's queue
    /// rather than running inline
    pub fn is_queued(&self) -> bool {
        matches!(
            self,
            Phase::AfterUpdateCommit
                | Phase::AfterSaveCommit
                | Phase::AfterCommit
                | Phase::AfterDeleteCommit
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a handler gets to see
///
/// `post_save_resource` is `None` before the underlying write and carries
/// the stored resource afterwards.
pub struct HandlerContext<'a, P> {
    pub change_set_persister: &'a P,
    pub change_set: &'a mut ChangeSet,
    pub post_save_resource: Option<&'a Resource>,
}

/// A unit of business logic invoked at a lifecycle phase
///
/// Any `Fn(&mut HandlerContext<'_, P>) -> Result<()>` closure is a handler.
pub trait Handler<P = ChangeSetPersister>: Send + Sync {
    fn run(&self, ctx: &mut HandlerContext<'_, P>) -> Result<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<P, F> Handler<P> for F
where
    F: Fn(&mut HandlerContext<'_, P>) -> Result<()> + Send + Sync,
{
    fn run(&self, ctx: &mut HandlerContext<'_, P>) -> Result<()> {
        self(ctx)
    }
}

/// Handler wrapping the whole save
///
/// A fresh instance is built for every save, so state set in
/// `run_before_save` is visible in `run_after_save`.
pub trait AroundHandler: Send {
    fn run_before_save(&mut self, ctx: &mut HandlerContext<'_, ChangeSetPersister>) -> Result<()>;

    fn run_after_save(&mut self, ctx: &mut HandlerContext<'_, ChangeSetPersister>) -> Result<()>;
}

pub type AroundHandlerFactory = Arc<dyn Fn() -> Box<dyn AroundHandler> + Send + Sync>;

/// Ordered handler table shared by a persister and every instance derived
/// from it
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    around_save: Vec<AroundHandlerFactory>,
    phases: HashMap<Phase, Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to `phase`
    pub fn register(&mut self, phase: Phase, handler: Arc<dyn Handler>) -> &mut Self {
        self.phases.entry(phase).or_default().push(handler);
        self
    }

    /// Append a closure handler to `phase`
    pub fn register_fn<F>(&mut self, phase: Phase, handler: F) -> &mut Self
    where
        F: Fn(&mut HandlerContext<'_, ChangeSetPersister>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(phase, Arc::new(handler))
    }

    pub fn around_save<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn AroundHandler> + Send + Sync + 'static,
    {
        self.around_save.push(Arc::new(factory));
        self
    }

    pub fn handlers(&self, phase: Phase) -> &[Arc<dyn Handler>] {
        self.phases.get(&phase).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn around_save_factories(&self) -> &[AroundHandlerFactory] {
        &self.around_save
    }

    pub fn len(&self) -> usize {
        self.around_save.len() + self.phases.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<(&str, usize)> = self
            .phases
            .iter()
            .map(|(phase, handlers)| (phase.as_str(), handlers.len()))
            .collect();
        counts.sort();
        f.debug_struct("HandlerRegistry")
            .field("around_save", &self.around_save.len())
            .field("phases", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Handler for Noop {
        fn run(&self, _ctx: &mut HandlerContext<'_, ChangeSetPersister>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_keeps_order_per_phase() {
        let mut registry = HandlerRegistry::new();
        let first: Arc<dyn Handler> = Arc::new(Noop);
        let second: Arc<dyn Handler> = Arc::new(Noop);
        registry
            .register(Phase::BeforeSave, first.clone())
            .register(Phase::BeforeSave, second.clone())
            .register_fn(Phase::AfterSave, |_ctx| Ok(()));

        let before = registry.handlers(Phase::BeforeSave);
        assert_eq!(before.len(), 2);
        assert!(Arc::ptr_eq(&before[0], &first));
        assert!(Arc::ptr_eq(&before[1], &second));
        assert_eq!(registry.handlers(Phase::AfterSave).len(), 1);
        assert!(registry.handlers(Phase::AfterCommit).is_empty());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_queued_phases() {
        assert!(!Phase::BeforeSave.is_queued());
        assert!(!Phase::AfterSave.is_queued());
        assert!(!Phase::BeforeDelete.is_queued());
        assert!(Phase::AfterUpdateCommit.is_queued());
        assert!(Phase::AfterSaveCommit.is_queued());
        assert!(Phase::AfterCommit.is_queued());
        assert!(Phase::AfterDeleteCommit.is_queued());
    }

    #[test]
    fn test_handler_name_defaults_to_type_name() {
        assert!(Noop.name().ends_with("Noop"));
    }
}
