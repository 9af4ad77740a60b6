//! Figgy Store - Concrete backends for the persistence pipeline
//!
//! Provides:
//! - SQLite metadata adapter with savepoint transactions
//! - Embedded, checksummed schema migrations
//! - Bucketed disk storage with retry and fallback decorators
//! - Delay-check wrapper for files on slow network mounts
//! - Config-driven wiring of a complete pipeline

pub mod db;
pub mod disk;
pub mod errors;
pub mod migrations;
pub mod pipeline;
pub mod sqlite;

pub use disk::{DelayCheckFile, DiskAdapter, FallbackDiskAdapter, RetryingDiskAdapter};
pub use pipeline::Pipeline;
pub use sqlite::SqliteAdapter;
