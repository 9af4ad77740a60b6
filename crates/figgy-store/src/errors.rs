//! Error helpers for figgy-store
//!
//! Store code returns the core `FiggyError` unchanged; these helpers build
//! it from rusqlite and filesystem failures.

use figgy_core::errors::FiggyError;

pub use figgy_core::errors::Result;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> FiggyError {
    FiggyError::Persistence {
        op: "migration".to_string(),
        message: format!("Migration {} failed: {}", migration_id, reason),
    }
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> FiggyError {
    FiggyError::Persistence {
        op: "migration_checksum".to_string(),
        message: format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ),
    }
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> FiggyError {
    FiggyError::Persistence {
        op: "sqlite".to_string(),
        message: err.to_string(),
    }
}

/// Create an IO error, keeping the errno for retry classification
pub fn io_error(operation: &str, err: &std::io::Error) -> FiggyError {
    FiggyError::io(operation, err)
}

/// Stored row that cannot be turned back into a resource
pub fn corrupt_row(id: &str, reason: impl std::fmt::Display) -> FiggyError {
    FiggyError::Serialization {
        message: format!("Stored resource {} is unreadable: {}", id, reason),
    }
}
