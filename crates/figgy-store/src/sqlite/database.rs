//! Shared connection with savepoint-based nesting

use crate::errors::{from_rusqlite, Result};
use figgy_core::adapter::Transactional;
use figgy_core::errors::FiggyError;
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One SQLite connection shared by the persister and query service
///
/// The lock is taken per statement, never across a transaction block, so a
/// block can keep issuing statements through the same connection.
pub(crate) struct Database {
    conn: Mutex<Connection>,
    depth: AtomicUsize,
    next_savepoint: AtomicUsize,
}

impl Database {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            depth: AtomicUsize::new(0),
            next_savepoint: AtomicUsize::new(0),
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| FiggyError::Internal {
            message: "sqlite connection poisoned".to_string(),
        })
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql).map_err(from_rusqlite)
    }
}

impl Transactional for Database {
    fn transaction(&self, savepoint: bool, block: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        if !savepoint && self.in_transaction() {
            return block();
        }

        let name = format!(
            "figgy_sp_{}",
            self.next_savepoint.fetch_add(1, Ordering::SeqCst)
        );
        self.execute_batch(&format!("SAVEPOINT {}", name))?;

        self.depth.fetch_add(1, Ordering::SeqCst);
        let result = block();
        self.depth.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(()) => self.execute_batch(&format!("RELEASE {}", name)),
            Err(err) => {
                if let Err(rollback_err) =
                    self.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name))
                {
                    tracing::error!(savepoint = %name, error = %rollback_err, "savepoint rollback failed");
                }
                tracing::debug!(savepoint = %name, "sqlite transaction rolled back");
                Err(err)
            }
        }
    }
}
