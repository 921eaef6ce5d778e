//! # relq
//!
//! A relationship-aware query layer over SQL backends. Tables are registered
//! with their fields and named relationships; reads come back as [`Row`]s with
//! hasOne relationships resolved through joins and hasMany relationships
//! resolved through concurrent sub-fetches.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relq::prelude::*;
//!
//! # async fn run() -> relq::Result<()> {
//! let db = Database::connect(&SqliteOptions::in_memory())?;
//!
//! let user = db.register("user", TableSpec::from_fields(["id", "first_name", "last_name"]))?;
//! let book = db.register(
//!     "book",
//!     TableSpec::from_fields(["id", "author_id", "title"]).relationship(
//!         "author",
//!         RelationshipSpec::has_one("user", "id").local("author_id"),
//!     ),
//! )?;
//!
//! let books = book
//!     .get(
//!         Conditions::new().eq("id", 1),
//!         &QueryOptions::new().relationships(RelationshipSelector::All),
//!     )
//!     .await?;
//! let author = books[0].one("author");
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! | Database | Driver   | Feature Flag | Status |
//! |----------|----------|--------------|--------|
//! | SQLite   | rusqlite | `rusqlite`   | ✅     |
//! | MySQL    | (any)    | n/a          | dialect only, bring a [`Backend`] |

mod database;
mod hydrate;
mod stream;
mod table;
mod write;

// =============================================================================
// Root-level exports
// =============================================================================

pub use database::Database;
pub use stream::{KeyStream, ReadStream};
pub use table::{Table, WriteMeta};
pub use write::{WriteEvent, WriteStream, WriteSummary};

/// Result type for relq operations
pub use relq_core::error::Result;

pub use relq_core::{
    Backend, Conditions, Dialect, FieldMap, Order, QueryOptions, Related, RelationshipSpec, Row,
    TableSpec, WriteStreamOptions,
};

/// Error types
pub mod error {
    pub use relq_core::error::{BackendError, RelqError};
}

/// Query model shared by every backend: conditions, options, relationship
/// specs, rows and the [`Backend`](relq_core::Backend) contract.
pub mod core {
    pub use relq_core::*;
}

/// SQLite driver.
#[cfg(feature = "rusqlite")]
pub mod sqlite {
    pub use relq_sqlite::{SqliteBackend, SqliteOptions, backend_error, values};
}

/// Everything needed to register tables and run queries.
pub mod prelude {
    pub use crate::{Database, KeyStream, ReadStream, Table, WriteEvent, WriteMeta, WriteStream};
    pub use relq_core::{
        Conditions, Direction, FieldMap, Order, PutOptions, QueryOptions, Related,
        RelationshipSelector, RelationshipSpec, Row, TableSpec, Via, WriteStreamOptions,
    };

    #[cfg(feature = "rusqlite")]
    pub use relq_sqlite::{SqliteBackend, SqliteOptions};
}
