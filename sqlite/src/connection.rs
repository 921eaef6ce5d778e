//! [`Backend`] over a single rusqlite connection.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use rusqlite::{Connection, ffi, params_from_iter};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use relq_core::{Backend, BackendError, Dialect, Execution, FieldMap, RowStream, WriteResult};

use crate::values::row_to_fields;

/// Connection options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SqliteOptions {
    /// path to the database file; `None` or `:memory:` opens an in-memory database
    #[serde(alias = "filename")]
    pub database: Option<String>,
}

impl SqliteOptions {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            database: Some(path.into()),
        }
    }
}

/// SQLite backend.
///
/// Statements run on the blocking thread pool. The connection is shared, so
/// concurrent statements from hydration fan-out are serialized on it.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        Connection::open_in_memory()
            .map(Self::from_connection)
            .map_err(backend_error)
    }

    pub fn open(path: &str) -> Result<Self, BackendError> {
        Connection::open(path)
            .map(Self::from_connection)
            .map_err(backend_error)
    }

    pub fn connect(options: &SqliteOptions) -> Result<Self, BackendError> {
        #[cfg(feature = "tracing")]
        tracing::debug!(database = ?options.database, "relq.sqlite.connect");

        match options.database.as_deref() {
            None | Some(":memory:") => Self::open_in_memory(),
            Some(path) => Self::open(path),
        }
    }

    /// Runs a batch of statements, e.g. a schema script.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        let conn = self.conn.clone().lock_owned().await;
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || conn.execute_batch(&sql).map_err(backend_error))
            .await
            .map_err(join_error)?
    }
}

impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<Execution, BackendError>> + Send {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let conn = conn.lock_owned().await;
            tokio::task::spawn_blocking(move || run(&conn, &sql, &params))
                .await
                .map_err(join_error)?
        }
    }

    fn stream_execute(&self, sql: &str) -> RowStream {
        let conn = self.conn.clone();
        let sql = sql.to_string();

        // The producer drains the cursor into an unbounded channel and then
        // releases the connection, so hydration queries issued while the
        // consumer is still reading never wait on the cursor.
        stream::once(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let conn = conn.lock_owned().await;
            tokio::task::spawn_blocking(move || {
                if let Err(err) = produce(&conn, &sql, &tx) {
                    let _ = tx.send(Err(err));
                }
            });
            stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
        })
        .flatten()
        .boxed()
    }

    fn close(&self) -> impl Future<Output = Result<(), BackendError>> + Send {
        let conn = self.conn.clone();
        async move {
            let conn = conn.lock().await;
            conn.flush_prepared_statement_cache();
            #[cfg(feature = "tracing")]
            tracing::debug!("relq.sqlite.close");
            Ok(())
        }
    }
}

fn run(conn: &Connection, sql: &str, params: &[Value]) -> Result<Execution, BackendError> {
    let mut stmt = conn.prepare(sql).map_err(backend_error)?;

    if stmt.column_count() > 0 {
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter())).map_err(backend_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(backend_error)? {
            out.push(row_to_fields(row, &columns).map_err(backend_error)?);
        }
        return Ok(Execution::Rows(out));
    }

    let affected = stmt.execute(params_from_iter(params.iter())).map_err(backend_error)?;
    let insert_id = is_insert(sql).then(|| conn.last_insert_rowid());
    Ok(Execution::Write(WriteResult {
        insert_id,
        affected_rows: affected as u64,
    }))
}

fn produce(
    conn: &Connection,
    sql: &str,
    tx: &mpsc::UnboundedSender<Result<FieldMap, BackendError>>,
) -> Result<(), BackendError> {
    let mut stmt = conn.prepare(sql).map_err(backend_error)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([]).map_err(backend_error)?;
    while let Some(row) = rows.next().map_err(backend_error)? {
        let fields = row_to_fields(row, &columns).map_err(backend_error)?;
        if tx.send(Ok(fields)).is_err() {
            // consumer dropped the stream
            break;
        }
    }
    Ok(())
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

/// Maps a rusqlite error, naming the extended constraint codes the dialect
/// classifier understands.
pub fn backend_error(err: rusqlite::Error) -> BackendError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(e, _) => Some(match e.extended_code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => "SQLITE_CONSTRAINT_PRIMARYKEY".to_string(),
            ffi::SQLITE_CONSTRAINT_UNIQUE => "SQLITE_CONSTRAINT_UNIQUE".to_string(),
            ffi::SQLITE_CONSTRAINT_NOTNULL => "SQLITE_CONSTRAINT_NOTNULL".to_string(),
            _ => format!("{:?}", e.code),
        }),
        _ => None,
    };
    BackendError {
        code,
        message: err.to_string(),
    }
}

fn join_error(err: tokio::task::JoinError) -> BackendError {
    BackendError::new(format!("sqlite worker failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use relq_core::Conflict;
    use serde_json::json;

    async fn backend() -> SqliteBackend {
        let backend = SqliteBackend::connect(&SqliteOptions::in_memory()).unwrap();
        backend
            .execute_batch(
                "CREATE TABLE book (id INTEGER PRIMARY KEY, title TEXT NOT NULL UNIQUE, score REAL);
                 INSERT INTO book (id, title, score) VALUES
                   (1, 'Pastoralia', 4.5),
                   (2, 'Airships', NULL);",
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn selects_rows_in_column_order() {
        let backend = backend().await;
        let rows = backend
            .execute("SELECT `id`, `title`, `score` FROM `book` ORDER BY `id`", &[])
            .await
            .unwrap()
            .into_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"id": 1, "title": "Pastoralia", "score": 4.5})
        );
        assert_eq!(rows[1].keys().collect::<Vec<_>>(), ["id", "title", "score"]);
    }

    #[tokio::test]
    async fn binds_parameters() {
        let backend = backend().await;
        let rows = backend
            .execute("SELECT title FROM book WHERE id = ?", &[json!(2)])
            .await
            .unwrap()
            .into_rows();
        assert_eq!(rows[0].get("title"), Some(&json!("Airships")));
    }

    #[tokio::test]
    async fn reports_write_results() {
        let backend = backend().await;
        let result = backend
            .execute("INSERT INTO book (title) VALUES ('Tenth of December')", &[])
            .await
            .unwrap()
            .write_result();
        assert_eq!(result, WriteResult { insert_id: Some(3), affected_rows: 1 });

        let result = backend
            .execute("UPDATE book SET score = 1", &[])
            .await
            .unwrap()
            .write_result();
        assert_eq!(result, WriteResult { insert_id: None, affected_rows: 3 });
    }

    #[tokio::test]
    async fn constraint_errors_are_classified() {
        let backend = backend().await;
        let keys = vec!["id".to_string(), "title".to_string()];

        let err = backend
            .execute("INSERT INTO book (id, title) VALUES (1, 'Other')", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("SQLITE_CONSTRAINT_PRIMARYKEY"));
        assert_eq!(
            backend.is_duplicate_key_conflict(&err, &keys),
            Some(Conflict::Duplicate { key: Some("id".into()) })
        );

        let err = backend
            .execute("INSERT INTO book (title) VALUES ('Airships')", &[])
            .await
            .unwrap_err();
        assert_eq!(
            backend.is_duplicate_key_conflict(&err, &keys),
            Some(Conflict::Duplicate { key: Some("title".into()) })
        );

        let err = backend
            .execute("INSERT INTO book (id) VALUES (9)", &[])
            .await
            .unwrap_err();
        assert_eq!(backend.is_duplicate_key_conflict(&err, &keys), Some(Conflict::IncompleteRow));

        let err = backend.execute("SELECT * FROM nope", &[]).await.unwrap_err();
        assert_eq!(backend.is_duplicate_key_conflict(&err, &keys), None);
    }

    #[tokio::test]
    async fn streams_rows() {
        let backend = backend().await;
        let rows: Vec<FieldMap> = backend
            .stream_execute("SELECT id FROM book ORDER BY id DESC")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.iter().map(|r| r["id"].clone()).collect::<Vec<_>>(), [json!(2), json!(1)]);

        let mut failing = backend.stream_execute("SELECT * FROM nope");
        assert!(failing.next().await.unwrap().is_err());
        assert!(failing.next().await.is_none());
    }
}
