//! Schema Registry: per-table definitions keyed by registration name.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{RelqError, Result};
use crate::relation::RelationshipSpec;
use crate::row::{Behavior, Constructor, FieldMap, Row, RowShape};

/// Default primary key column.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Table registration input.
///
/// ```ignore
/// let spec = TableSpec::from_fields(["id", "first_name", "last_name"])
///     .method("fullName", |row| json!(format!("{} {}", ...)))
///     .relationship("books", RelationshipSpec::has_many("book", "author_id").local("id"));
/// ```
#[derive(Default, Clone)]
pub struct TableSpec {
    table_name: Option<String>,
    primary_key: Option<String>,
    fields: Vec<String>,
    methods: Vec<(String, Behavior)>,
    constructor: Option<Constructor>,
    relationships: Vec<(String, RelationshipSpec)>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TableSpecJson {
    table_name: Option<String>,
    primary_key: Option<String>,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    relationships: serde_json::Map<String, Value>,
}

impl TableSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a spec that only lists its columns.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().fields(fields)
    }

    /// SQL table name, when it differs from the registration name.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, behavior: F) -> Self
    where
        F: Fn(&Row) -> Value + Send + Sync + 'static,
    {
        self.methods.push((name.into(), Arc::new(behavior)));
        self
    }

    /// Custom row constructor. Table behaviors are attached to whatever it
    /// returns.
    pub fn constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(FieldMap) -> Row + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, spec: RelationshipSpec) -> Self {
        self.relationships.push((name.into(), spec));
        self
    }
}

impl TryFrom<Value> for TableSpec {
    type Error = RelqError;

    /// Reads the data-only part of a registration (`tableName`, `primaryKey`,
    /// `fields`, `relationships`). Methods and constructors are code and
    /// have to be added with the builder.
    fn try_from(value: Value) -> Result<Self> {
        let json: TableSpecJson = serde_json::from_value(value)
            .map_err(|e| RelqError::validation(format!("invalid table definition: {e}")))?;
        let mut spec = TableSpec::from_fields(json.fields);
        spec.table_name = json.table_name;
        spec.primary_key = json.primary_key;
        for (name, rel) in json.relationships {
            spec = spec.relationship(name, RelationshipSpec::try_from(rel)?);
        }
        Ok(spec)
    }
}

impl fmt::Debug for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSpec")
            .field("table_name", &self.table_name)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields)
            .field("methods", &self.methods.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("constructor", &self.constructor.is_some())
            .field("relationships", &self.relationships)
            .finish()
    }
}

/// A registered table.
pub struct TableDef {
    name: String,
    table: String,
    primary_key: String,
    fields: Vec<String>,
    relationships: Vec<(String, RelationshipSpec)>,
    shape: Arc<RowShape>,
    constructor: Option<Constructor>,
}

impl TableDef {
    fn from_spec(name: &str, spec: TableSpec) -> Result<Self> {
        let primary_key = spec
            .primary_key
            .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string());
        if primary_key.is_empty() {
            return Err(RelqError::validation(format!(
                "table `{name}` has an empty primary key"
            )));
        }

        let mut fields = Vec::with_capacity(spec.fields.len() + 1);
        fields.push(primary_key.clone());
        for field in spec.fields {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }

        let table = spec.table_name.unwrap_or_else(|| name.to_string());
        let shape = Arc::new(RowShape::new(table.clone()));
        for (method, behavior) in spec.methods {
            shape.insert(method, behavior);
        }

        Ok(Self {
            name: name.to_string(),
            table,
            primary_key,
            fields,
            relationships: spec.relationships,
            shape,
            constructor: spec.constructor,
        })
    }

    /// Registration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Columns, primary key first.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Declared relationships, in declaration order.
    pub fn relationships(&self) -> &[(String, RelationshipSpec)] {
        &self.relationships
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipSpec> {
        self.relationships
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    pub fn shape(&self) -> &Arc<RowShape> {
        &self.shape
    }

    /// Attaches a behavior; rows hydrated before and after see it.
    pub fn add_method(&self, name: impl Into<String>, behavior: Behavior) {
        self.shape.insert(name, behavior);
    }

    /// Turns a plain field map into a row instance of this table.
    pub fn build_row(&self, fields: FieldMap) -> Row {
        let row = match &self.constructor {
            Some(constructor) => constructor(fields),
            None => Row::from_fields(fields),
        };
        row.with_shape(self.shape.clone())
    }
}

impl fmt::Debug for TableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields)
            .field("relationships", &self.relationships)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Registered tables by name.
#[derive(Debug, Default)]
pub struct Registry {
    tables: RwLock<HashMap<String, Arc<TableDef>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, replacing any earlier definition under `name`.
    pub fn register(&self, name: &str, spec: TableSpec) -> Result<Arc<TableDef>> {
        let def = Arc::new(TableDef::from_spec(name, spec)?);
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), def.clone());
        Ok(def)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<TableDef>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RelqError::NotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
