//! SQLite metadata adapter
//!
//! Resources live in a single `resources` table with their attributes as a
//! JSON object. Transactions are savepoints on the shared connection, so
//! `buffer_into_index` and the composite persister get real nesting and
//! rollback. Parent and inverse-reference lookups use SQLite's JSON
//! functions over the stored attributes.

mod database;
mod persister;
mod query_service;
mod row;

use crate::db;
use crate::errors::Result;
use crate::migrations::apply_migrations;
use database::Database;
use figgy_core::adapter::{MetadataAdapter, Persister, QueryService, Transactional};
use persister::SqlitePersister;
use query_service::SqliteQueryService;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct SqliteAdapter {
    db: Arc<Database>,
    persister: Arc<SqlitePersister>,
    query_service: Arc<SqliteQueryService>,
}

impl SqliteAdapter {
    /// Open (creating if needed) and migrate the database at `path`
    ///
    /// # Errors
    ///
    /// Returns `FiggyError::Persistence` if the file cannot be opened or a
    /// migration fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(db::open(path)?)
    }

    /// # Errors
    ///
    /// Returns `FiggyError::Persistence` if migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(db::open_in_memory()?)
    }

    /// Configure and migrate an already opened connection
    ///
    /// # Errors
    ///
    /// Returns `FiggyError::Persistence` if configuration or a migration
    /// fails.
    pub fn from_connection(mut conn: Connection) -> Result<Self> {
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;

        let db = Arc::new(Database::new(conn));
        Ok(Self {
            persister: Arc::new(SqlitePersister::new(db.clone())),
            query_service: Arc::new(SqliteQueryService::new(db.clone())),
            db,
        })
    }

    /// Transaction handle for the shared connection
    pub fn connection(&self) -> Arc<dyn Transactional> {
        self.db.clone()
    }

    pub fn in_transaction(&self) -> bool {
        self.db.in_transaction()
    }
}

impl MetadataAdapter for SqliteAdapter {
    fn persister(&self) -> Arc<dyn Persister> {
        self.persister.clone()
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        self.query_service.clone()
    }
}
