use std::sync::Arc;

use relq_core::error::Result;
use relq_core::{Backend, FieldMap, Registry, TableSpec, WriteResult};

use crate::table::Table;

/// State shared by a database handle and every table handle made from it.
pub(crate) struct Shared<B: Backend> {
    pub(crate) backend: B,
    pub(crate) registry: Registry,
}

impl<B: Backend> Shared<B> {
    /// Runs a read and returns its rows.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub(crate) async fn fetch(&self, sql: &str, debug: bool) -> Result<Vec<FieldMap>> {
        relq_core::relq_trace_query!(sql, 0, debug);
        Ok(self.backend.execute(sql, &[]).await?.into_rows())
    }

    /// Runs a write and returns its insert id / affected-row count.
    pub(crate) async fn write(
        &self,
        sql: &str,
    ) -> std::result::Result<WriteResult, relq_core::BackendError> {
        relq_core::relq_trace_query!(sql, 0);
        Ok(self.backend.execute(sql, &[]).await?.write_result())
    }
}

/// A connection plus its table registry.
///
/// ```ignore
/// let db = Database::new(SqliteBackend::open_in_memory()?);
/// let user = db.register("user", TableSpec::from_fields(["id", "first_name"]))?;
/// let rows = user.get(Conditions::new().eq("id", 1), &QueryOptions::new()).await?;
/// ```
pub struct Database<B: Backend> {
    inner: Arc<Shared<B>>,
}

impl<B: Backend> Clone for Database<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend> Database<B> {
    pub fn new(backend: B) -> Self {
        Self {
            inner: Arc::new(Shared {
                backend,
                registry: Registry::new(),
            }),
        }
    }

    /// Registers (or re-registers) a table and returns its handle.
    pub fn register(&self, name: &str, spec: TableSpec) -> Result<Table<B>> {
        let def = self.inner.registry.register(name, spec)?;
        Ok(Table::new(self.inner.clone(), def))
    }

    /// Handle of an already registered table.
    pub fn table(&self, name: &str) -> Result<Table<B>> {
        let def = self.inner.registry.lookup(name)?;
        Ok(Table::new(self.inner.clone(), def))
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.backend.close().await?;
        Ok(())
    }
}

#[cfg(feature = "rusqlite")]
impl Database<relq_sqlite::SqliteBackend> {
    /// Opens a SQLite database.
    pub fn connect(options: &relq_sqlite::SqliteOptions) -> Result<Self> {
        Ok(Self::new(relq_sqlite::SqliteBackend::connect(options)?))
    }
}
