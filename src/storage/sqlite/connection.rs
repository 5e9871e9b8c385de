//! Shared connection handling for `SQLite`.
//!
//! Lock helpers with poison recovery, connection pragmas, and mapping of
//! `rusqlite` failures onto the crate error taxonomy.

use crate::{Error, Result};
use rusqlite::{Connection, ErrorCode};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// the inner value is recovered and a warning is logged.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mutex was poisoned, recovering");
            metrics::counter!("graph_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Acquires a read lock with poison recovery.
pub fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Graph index lock was poisoned, recovering");
            metrics::counter!("graph_index_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Acquires a write lock with poison recovery.
pub fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Graph index lock was poisoned, recovering");
            metrics::counter!("graph_index_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection.
///
/// # Configuration Applied
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits for locks instead of failing immediately
/// - **`foreign_keys`**: enforces `ON DELETE CASCADE` from relationships to nodes
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row ("wal"/"memory"), so its result is ignored
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS.to_string());
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::OperationFailed {
            operation: "enable_foreign_keys".to_string(),
            cause: e.to_string(),
        })
}

/// Maps a `rusqlite` error onto the crate taxonomy.
///
/// Constraint violations become [`Error::Duplicate`]; busy and locked
/// databases become retryable [`Error::Timeout`]s.
pub fn map_sqlite_error(operation: &str, err: &rusqlite::Error) -> Error {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => Error::Duplicate(format!("{operation}: {err}")),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Error::Timeout {
            operation: operation.to_string(),
            after_ms: BUSY_TIMEOUT_MS,
        },
        _ => Error::OperationFailed {
            operation: operation.to_string(),
            cause: err.to_string(),
        },
    }
}
