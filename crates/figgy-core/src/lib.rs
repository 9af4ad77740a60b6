//! Figgy Core - Change-set persistence pipeline
//!
//! This crate provides the orchestration layer between validated change sets
//! and the metadata/storage backends, including:
//! - Resource and ChangeSet models
//! - Metadata adapter contracts with an in-memory transactional backend
//! - Buffering, composite, indexing, read-only and instrumented adapters
//! - Instant and delayed callback queues
//! - Phase-ordered handler registry
//! - `ChangeSetPersister` and the narrower `PlumChangeSetPersister`
//! - Error and logging facilities, configuration loading

pub mod adapter;
pub mod change_set_persister;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod logging_facility;
pub mod model;
pub mod plum;
pub mod queue;
pub mod storage;

// Re-export commonly used types
pub use adapter::{MetadataAdapter, Persister, QueryService, Transactional};
pub use change_set_persister::{ChangeSetPersister, PersisterOptions};
pub use errors::{ExError, ExErrorKind, FiggyError, Result};
pub use handlers::{AroundHandler, Handler, HandlerContext, HandlerRegistry, Phase};
pub use model::{ChangeSet, Resource};
pub use plum::{CommitHandler, PlumChangeSetPersister, PlumHandlers};
pub use queue::{CallbackQueue, DelayedQueue, InstantQueue};
pub use storage::{StorageAdapter, StoredFile};
