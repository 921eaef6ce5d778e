//! SQLite backend for relq
//!
//! Runs relq statements on a rusqlite connection (bundled SQLite).

mod connection;
pub mod values;

pub use connection::{SqliteBackend, SqliteOptions, backend_error};
