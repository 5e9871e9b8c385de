//! Shared `SQLite` infrastructure for the fallback driver.

mod connection;

pub use connection::{
    BUSY_TIMEOUT_MS, acquire_lock, configure_connection, map_sqlite_error, read_lock, write_lock,
};
