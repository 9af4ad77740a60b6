//! Config-driven wiring of a complete persistence pipeline
//!
//! Metadata: an instrumented indexing adapter writing to SQLite (primary)
//! and an in-memory search index (secondary). Storage: bucketed disk with
//! upload retry, optionally reading through to a fallback repository, or
//! in-memory storage when no repository is configured.

use crate::disk::{DelayCheckFile, DiskAdapter, FallbackDiskAdapter, RetryingDiskAdapter};
use crate::errors::Result;
use crate::sqlite::SqliteAdapter;
use figgy_core::adapter::{IndexingAdapter, InstrumentedAdapter, MemoryAdapter, MetadataAdapter, ReadOnlyAdapter};
use figgy_core::config::{PipelineConfig, StorageConfig};
use figgy_core::storage::{MemoryStorage, StorageAdapter};
use figgy_core::{ChangeSetPersister, HandlerRegistry, PlumChangeSetPersister, PlumHandlers};
use figgy_core_types::FileId;
use std::sync::Arc;

pub struct Pipeline {
    config: PipelineConfig,
    primary: SqliteAdapter,
    index: MemoryAdapter,
    metadata_adapter: Arc<dyn MetadataAdapter>,
    storage_adapter: Arc<dyn StorageAdapter>,
    handlers: Arc<HandlerRegistry>,
}

impl Pipeline {
    /// Build every backend named by `config`
    ///
    /// # Errors
    ///
    /// Returns `FiggyError::Config` for invalid settings and
    /// `FiggyError::Persistence` if the database cannot be opened or
    /// migrated.
    pub fn from_config(config: &PipelineConfig, handlers: HandlerRegistry) -> Result<Self> {
        config.validate()?;

        let primary = match &config.database.path {
            Some(path) => SqliteAdapter::open(path)?,
            None => SqliteAdapter::open_in_memory()?,
        };
        let index = MemoryAdapter::search_index();
        let indexing = IndexingAdapter::new(Arc::new(primary.clone()), Arc::new(index.clone()))
            .with_no_index_models(config.indexing.no_index_models.iter().cloned());
        let metadata_adapter: Arc<dyn MetadataAdapter> =
            Arc::new(InstrumentedAdapter::new(Arc::new(indexing)));

        let storage_adapter = storage_from_config(&config.storage)?;

        tracing::info!(
            database = ?config.database.path,
            repository = ?config.storage.repository_path,
            fallback = ?config.storage.fallback_path,
            no_index_models = config.indexing.no_index_models.len(),
            "pipeline wired"
        );

        Ok(Self {
            config: config.clone(),
            primary,
            index,
            metadata_adapter,
            storage_adapter,
            handlers: Arc::new(handlers),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metadata_adapter(&self) -> &Arc<dyn MetadataAdapter> {
        &self.metadata_adapter
    }

    pub fn storage_adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage_adapter
    }

    /// The SQLite primary, bypassing indexing and instrumentation
    pub fn primary(&self) -> &SqliteAdapter {
        &self.primary
    }

    /// The search index secondary
    pub fn index(&self) -> &MemoryAdapter {
        &self.index
    }

    pub fn change_set_persister(&self) -> ChangeSetPersister {
        ChangeSetPersister::new(
            self.metadata_adapter.clone(),
            self.storage_adapter.clone(),
            self.handlers.clone(),
            self.config.persister_options(),
        )
    }

    pub fn plum_change_set_persister(&self, handlers: PlumHandlers) -> PlumChangeSetPersister {
        PlumChangeSetPersister::new(
            self.metadata_adapter.clone(),
            self.storage_adapter.clone(),
            Arc::new(handlers),
            self.config.persister.characterize,
        )
    }

    /// Query-only handle on the primary
    pub fn read_only_adapter(&self) -> ReadOnlyAdapter {
        ReadOnlyAdapter::new(Arc::new(self.primary.clone()))
    }

    /// Look up a stored file behind the configured delay check
    ///
    /// The returned handle probes the file on first use, not here.
    ///
    /// # Errors
    ///
    /// Returns `FiggyError::FileNotFound` if no adapter has the file.
    pub fn open_file(&self, id: &FileId) -> Result<DelayCheckFile> {
        let file = self.storage_adapter.find_by(id)?;
        Ok(DelayCheckFile::new(
            file,
            self.config.storage.delay_check_timeout(),
        ))
    }
}

fn storage_from_config(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
    let Some(repository) = &config.repository_path else {
        return Ok(Arc::new(MemoryStorage::new()));
    };

    let retrying: Arc<dyn StorageAdapter> = Arc::new(
        RetryingDiskAdapter::new(Arc::new(DiskAdapter::new(repository)))
            .with_max_attempts(config.upload_attempts),
    );

    match &config.fallback_path {
        Some(fallback) => Ok(Arc::new(FallbackDiskAdapter::new(
            retrying,
            Arc::new(DiskAdapter::new(fallback)),
        )?)),
        None => Ok(retrying),
    }
}
