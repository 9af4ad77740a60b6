use figgy_core::adapter::{MemoryAdapter, MetadataAdapter, Persister, QueryService};
use figgy_core::storage::MemoryStorage;
use figgy_core::{
    AroundHandler, ChangeSetPersister, FiggyError, HandlerContext, HandlerRegistry,
    PersisterOptions, Resource, Result,
};
use std::sync::{Arc, Mutex};

/// Shared, ordered record of handler invocations
pub type Log = Arc<Mutex<Vec<String>>>;

#[allow(dead_code)]
pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[allow(dead_code)]
pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Handler that appends `name` to the log
#[allow(dead_code)]
pub fn recorder(
    log: &Log,
    name: &str,
) -> impl Fn(&mut HandlerContext<'_, ChangeSetPersister>) -> Result<()> + Send + Sync + 'static {
    let log = log.clone();
    let name = name.to_string();
    move |_ctx| {
        log.lock().unwrap().push(name.clone());
        Ok(())
    }
}

/// Around handler logging `<name>:before` and `<name>:after`
#[allow(dead_code)]
pub struct RecordingAround {
    pub log: Log,
    pub name: String,
}

impl AroundHandler for RecordingAround {
    fn run_before_save(&mut self, _ctx: &mut HandlerContext<'_, ChangeSetPersister>) -> Result<()> {
        self.log.lock().unwrap().push(format!("{}:before", self.name));
        Ok(())
    }

    fn run_after_save(&mut self, ctx: &mut HandlerContext<'_, ChangeSetPersister>) -> Result<()> {
        assert!(ctx.post_save_resource.is_some());
        self.log.lock().unwrap().push(format!("{}:after", self.name));
        Ok(())
    }
}

#[allow(dead_code)]
pub fn persister_over(
    metadata: Arc<dyn MetadataAdapter>,
    registry: HandlerRegistry,
) -> ChangeSetPersister {
    ChangeSetPersister::new(
        metadata,
        Arc::new(MemoryStorage::new()),
        Arc::new(registry),
        PersisterOptions::default(),
    )
}

#[allow(dead_code)]
pub fn memory_persister(registry: HandlerRegistry) -> (MemoryAdapter, ChangeSetPersister) {
    let adapter = MemoryAdapter::new();
    let persister = persister_over(Arc::new(adapter.clone()), registry);
    (adapter, persister)
}

/// Persister whose every write fails
#[allow(dead_code)]
pub struct FailingPersister;

impl Persister for FailingPersister {
    fn save(&self, _resource: Resource, _external_resource: bool) -> Result<Resource> {
        Err(FiggyError::Persistence {
            op: "save".to_string(),
            message: "index unavailable".to_string(),
        })
    }

    fn delete(&self, _resource: Resource) -> Result<Resource> {
        Err(FiggyError::Persistence {
            op: "delete".to_string(),
            message: "index unavailable".to_string(),
        })
    }
}

/// Adapter over a [`FailingPersister`] with an empty query side
#[allow(dead_code)]
pub struct FailingAdapter {
    queries: MemoryAdapter,
}

#[allow(dead_code)]
impl FailingAdapter {
    pub fn new() -> Self {
        Self {
            queries: MemoryAdapter::search_index(),
        }
    }
}

impl MetadataAdapter for FailingAdapter {
    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(FailingPersister)
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        self.queries.query_service()
    }
}
