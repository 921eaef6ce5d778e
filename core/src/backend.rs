//! The seam between the query layer and a database driver.

use std::future::Future;

use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::dialect::{Conflict, Dialect};
use crate::error::BackendError;
use crate::row::FieldMap;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub insert_id: Option<i64>,
    pub affected_rows: u64,
}

/// Outcome of [`Backend::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// the statement returned rows (column order preserved)
    Rows(Vec<FieldMap>),
    Write(WriteResult),
}

impl Execution {
    pub fn into_rows(self) -> Vec<FieldMap> {
        match self {
            Execution::Rows(rows) => rows,
            Execution::Write(_) => Vec::new(),
        }
    }

    pub fn write_result(&self) -> WriteResult {
        match self {
            Execution::Rows(_) => WriteResult::default(),
            Execution::Write(result) => *result,
        }
    }
}

/// Live row source. Dropping it stops the cursor.
pub type RowStream = BoxStream<'static, Result<FieldMap, BackendError>>;

/// A database driver.
///
/// Implementations only move SQL text and rows; statement synthesis, escaping
/// rules and conflict classification come from [`Dialect`] by default.
pub trait Backend: Send + Sync + 'static {
    fn dialect(&self) -> Dialect;

    /// Runs one statement. `params` bind to `?` placeholders, if any.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<Execution, BackendError>> + Send;

    /// Runs a query and yields its rows one at a time. Polling the stream less
    /// often throttles the cursor.
    fn stream_execute(&self, sql: &str) -> RowStream;

    fn escape_identifier(&self, name: &str) -> String {
        self.dialect().escape_identifier(name)
    }

    fn escape_literal(&self, value: &Value) -> String {
        self.dialect().escape_literal(value)
    }

    /// Classifies a failed INSERT against the candidate keys (primary key first).
    fn is_duplicate_key_conflict(
        &self,
        err: &BackendError,
        candidate_keys: &[String],
    ) -> Option<Conflict> {
        self.dialect().classify_conflict(err, candidate_keys)
    }

    /// Releases the connection.
    fn close(&self) -> impl Future<Output = Result<(), BackendError>> + Send {
        async { Ok(()) }
    }
}
