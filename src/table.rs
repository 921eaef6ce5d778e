use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;

use relq_core::error::{RelqError, Result};
use relq_core::query::{compile_delete, compile_insert, compile_select, compile_update};
use relq_core::relation::expand;
use relq_core::{
    Backend, Conditions, Conflict, FieldMap, FieldSelection, PutOptions, QueryOptions, Row,
    SelectQuery, TableDef, WriteStreamOptions,
};

use crate::database::Shared;
use crate::hydrate::{hydrate_many, hydrate_one};
use crate::stream::{KeyStream, ReadStream};
use crate::write::WriteStream;

/// Outcome of `put`, `update` and `del`.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteMeta {
    /// the row as given
    pub row: FieldMap,
    pub sql: String,
    /// set when the row was inserted
    pub insert_id: Option<i64>,
    pub affected_rows: u64,
}

/// Handle on one registered table.
pub struct Table<B: Backend> {
    db: Arc<Shared<B>>,
    def: Arc<TableDef>,
}

impl<B: Backend> Clone for Table<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            def: self.def.clone(),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Table<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("def", &self.def).finish()
    }
}

impl<B: Backend> Table<B> {
    pub(crate) fn new(db: Arc<Shared<B>>, def: Arc<TableDef>) -> Self {
        Self { db, def }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn primary_key(&self) -> &str {
        self.def.primary_key()
    }

    pub fn definition(&self) -> &Arc<TableDef> {
        &self.def
    }

    /// Attaches a behavior to every row of this table, including rows
    /// already handed out.
    pub fn add_method<F>(&self, name: impl Into<String>, behavior: F)
    where
        F: Fn(&Row) -> Value + Send + Sync + 'static,
    {
        self.def.add_method(name, Arc::new(behavior));
    }

    /// Compiles a read. Raw conditions skip relationships entirely.
    fn select(
        &self,
        conditions: Conditions,
        options: &QueryOptions,
    ) -> Result<(SelectQuery, String)> {
        let tree = if conditions.is_raw() {
            Vec::new()
        } else {
            let (specs, depth) = options
                .relationships
                .resolve(&self.def, options.relationships_depth)?;
            expand(&self.db.registry, &self.def, &specs, depth)?
        };

        let limit = if options.single { Some(1) } else { options.limit };
        let query = SelectQuery::new(self.def.clone())
            .fields(FieldSelection::from_options(
                options.include.as_deref(),
                options.exclude.as_deref(),
            ))
            .conditions(conditions)
            .relationships(tree)
            .order(options.order.clone())
            .limit(limit)
            .page(options.page);
        let sql = compile_select(&self.db.registry, self.db.backend.dialect(), &query)?;
        Ok((query, sql))
    }

    /// Rows matching `conditions`, hydrated with the requested relationships.
    pub async fn get(&self, conditions: Conditions, options: &QueryOptions) -> Result<Vec<Row>> {
        let (query, sql) = self.select(conditions, options)?;
        let rows = self.db.fetch(&sql, options.debug).await?;
        hydrate_many(&self.db, &self.def, rows, &query.relationships).await
    }

    /// The first matching row, or `None`.
    pub async fn get_one(
        &self,
        conditions: Conditions,
        options: &QueryOptions,
    ) -> Result<Option<Row>> {
        let options = QueryOptions {
            limit: Some(1),
            single: true,
            ..options.clone()
        };
        Ok(self.get(conditions, &options).await?.into_iter().next())
    }

    pub async fn get_all(&self) -> Result<Vec<Row>> {
        self.get(Conditions::default(), &QueryOptions::default()).await
    }

    /// Inserts `row`, or updates the existing row it collides with.
    ///
    /// A duplicate on one of the candidate keys (the primary key, then
    /// `options.unique_key`) that the row carries falls back to an update by
    /// that key. A row that is missing required columns but carries its
    /// primary key is treated as a partial update of that row; when no such row
    /// exists the insert error is returned.
    pub async fn put(&self, row: FieldMap, options: &PutOptions) -> Result<WriteMeta> {
        let dialect = self.db.backend.dialect();
        let sql = compile_insert(dialect, self.def.table(), &row);

        let err = match self.db.write(&sql).await {
            Ok(result) => {
                return Ok(WriteMeta {
                    row,
                    sql,
                    insert_id: result.insert_id,
                    affected_rows: result.affected_rows,
                });
            }
            Err(err) => err,
        };

        let keys = options.candidate_keys(self.def.primary_key());
        match self.db.backend.is_duplicate_key_conflict(&err, &keys) {
            Some(Conflict::Duplicate { key: Some(key) }) if row.contains_key(&key) => {
                relq_core::relq_trace_write!("update_fallback", self.def.table());
                self.update(row, &[key]).await
            }
            Some(Conflict::Duplicate { key }) => Err(RelqError::DuplicateKey { key, source: err }),
            Some(Conflict::IncompleteRow) if row.contains_key(self.def.primary_key()) => {
                relq_core::relq_trace_write!("partial_update", self.def.table());
                let key = self.def.primary_key().to_string();
                let meta = self.update(row, &[key]).await?;
                // no existing row to complete, so the insert failure stands
                if meta.affected_rows == 0 {
                    return Err(RelqError::Execution(err));
                }
                Ok(meta)
            }
            Some(Conflict::IncompleteRow) | None => Err(RelqError::Execution(err)),
        }
    }

    /// Updates at most one row, matched on `key_columns` (the primary key
    /// when empty).
    pub async fn update(&self, row: FieldMap, key_columns: &[String]) -> Result<WriteMeta> {
        let primary;
        let key_columns = if key_columns.is_empty() {
            primary = [self.def.primary_key().to_string()];
            &primary[..]
        } else {
            key_columns
        };
        let sql = compile_update(self.db.backend.dialect(), self.def.table(), &row, key_columns)?;
        let result = self.db.write(&sql).await?;
        Ok(WriteMeta {
            row,
            sql,
            insert_id: None,
            affected_rows: result.affected_rows,
        })
    }

    /// Deletes matching rows, at most `limit` of them.
    pub async fn del(&self, conditions: Conditions, limit: Option<u64>) -> Result<WriteMeta> {
        let sql = compile_delete(self.db.backend.dialect(), self.def.table(), &conditions, limit)?;
        let result = self.db.write(&sql).await?;
        Ok(WriteMeta {
            row: FieldMap::new(),
            sql,
            insert_id: None,
            affected_rows: result.affected_rows,
        })
    }

    /// Streams matching rows, each one fully hydrated, in source order.
    pub fn create_read_stream(
        &self,
        conditions: Conditions,
        options: &QueryOptions,
    ) -> Result<ReadStream> {
        let (query, sql) = self.select(conditions, options)?;
        relq_core::relq_trace_query!(&sql, 0, options.debug);

        let source = self.db.backend.stream_execute(&sql);
        let db = self.db.clone();
        let def = self.def.clone();
        let tree = Arc::new(query.relationships);
        Ok(ReadStream::new(source, move |flat| {
            let db = db.clone();
            let def = def.clone();
            let tree = tree.clone();
            async move { hydrate_one(&db, &def, flat, &tree).await }.boxed()
        }))
    }

    /// Streams the primary key of every matching row.
    pub fn create_key_stream(&self, conditions: Conditions) -> Result<KeyStream> {
        let options = QueryOptions::new().include([self.def.primary_key()]);
        let rows = self.create_read_stream(conditions, &options)?;
        Ok(KeyStream::new(rows, self.def.primary_key()))
    }

    /// Bulk upsert sink; see [`WriteStream`].
    pub fn create_write_stream(&self, options: WriteStreamOptions) -> WriteStream<B> {
        WriteStream::new(self.clone(), options)
    }
}
