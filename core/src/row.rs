//! Hydrated rows: a scalar field map plus fulfilled relationships.
//!
//! Behaviors are not stored on the row itself. Each row carries a handle to its
//! table's [`RowShape`], so a method attached after registration is visible to
//! every row hydrated from that table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde_json::Value;

use crate::error::{RelqError, Result};

/// A flat column → value map, in column order.
pub type FieldMap = serde_json::Map<String, Value>;

/// A named row behavior.
pub type Behavior = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

/// Builds a row instance from a plain field map.
pub type Constructor = Arc<dyn Fn(FieldMap) -> Row + Send + Sync>;

/// Table-level behavior table shared by every row of one table.
pub struct RowShape {
    table: String,
    behaviors: RwLock<HashMap<String, Behavior>>,
}

impl RowShape {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            behaviors: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Adds or replaces a behavior.
    pub fn insert(&self, name: impl Into<String>, behavior: Behavior) {
        self.behaviors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), behavior);
    }

    pub fn get(&self, name: &str) -> Option<Behavior> {
        self.behaviors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .behaviors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for RowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowShape")
            .field("table", &self.table)
            .field("behaviors", &self.names())
            .finish()
    }
}

/// Data fulfilled for one relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// hasOne; `None` when an optional join found no foreign row
    One(Option<Box<Row>>),
    /// hasMany, in backend order
    Many(Vec<Row>),
}

impl Serialize for Related {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Related::One(row) => row.serialize(serializer),
            Related::Many(rows) => rows.serialize(serializer),
        }
    }
}

/// A hydrated row.
#[derive(Clone, Default)]
pub struct Row {
    fields: FieldMap,
    relations: BTreeMap<String, Related>,
    kind: Option<String>,
    shape: Option<Arc<RowShape>>,
}

impl Row {
    pub fn from_fields(fields: FieldMap) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Labels the row with an instance kind, typically from a custom constructor.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Attaches the behavior table of the row's table.
    pub fn with_shape(mut self, shape: Arc<RowShape>) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Name of the table this row was hydrated from, if known.
    pub fn table(&self) -> Option<&str> {
        self.shape.as_deref().map(RowShape::table)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn into_fields(self) -> FieldMap {
        self.fields
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, Related> {
        &self.relations
    }

    pub fn set_related(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    pub fn take_related(&mut self, name: &str) -> Option<Related> {
        self.relations.remove(name)
    }

    /// The hasOne row for `name`, when present.
    pub fn one(&self, name: &str) -> Option<&Row> {
        match self.relations.get(name) {
            Some(Related::One(Some(row))) => Some(row),
            _ => None,
        }
    }

    /// The hasMany rows for `name`, when the relationship was fulfilled.
    pub fn many(&self, name: &str) -> Option<&[Row]> {
        match self.relations.get(name) {
            Some(Related::Many(rows)) => Some(rows),
            _ => None,
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.shape.as_ref().is_some_and(|s| s.get(name).is_some())
    }

    /// Invokes a behavior of the row's table.
    pub fn call(&self, name: &str) -> Result<Value> {
        let behavior = self
            .shape
            .as_ref()
            .and_then(|s| s.get(name))
            .ok_or_else(|| RelqError::validation(format!("row has no method `{name}`")))?;
        Ok(behavior(self))
    }

    /// Nested JSON view of the row, relationships included.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decodes the row (and its relationships) into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| RelqError::validation(format!("cannot decode row: {e}")))
    }
}

impl From<FieldMap> for Row {
    fn from(fields: FieldMap) -> Self {
        Row::from_fields(fields)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.relations == other.relations && self.kind == other.kind
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Row");
        if let Some(kind) = &self.kind {
            s.field("kind", kind);
        }
        s.field("fields", &self.fields);
        if !self.relations.is_empty() {
            s.field("relations", &self.relations);
        }
        s.finish()
    }
}

impl Serialize for Row {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.relations.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        for (k, v) in &self.relations {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => FieldMap::new(),
        }
    }

    #[test]
    fn behaviors_added_later_are_visible() {
        let shape = Arc::new(RowShape::new("user"));
        let row = Row::from_fields(fields(json!({"first_name": "Kelly", "last_name": "Link"})))
            .with_shape(shape.clone());

        assert!(!row.has_method("fullName"));
        shape.insert(
            "fullName",
            Arc::new(|row: &Row| {
                let first = row.get("first_name").and_then(Value::as_str).unwrap_or_default();
                let last = row.get("last_name").and_then(Value::as_str).unwrap_or_default();
                json!(format!("{first} {last}"))
            }),
        );
        assert_eq!(row.call("fullName").unwrap(), json!("Kelly Link"));
        assert!(row.call("missing").is_err());
    }

    #[test]
    fn serializes_relations_inline() {
        let mut book = Row::from_fields(fields(json!({"id": 1, "title": "Pastoralia"})));
        let author = Row::from_fields(fields(json!({"id": 1, "last_name": "Saunders"})));
        book.set_related("author", Related::One(Some(Box::new(author))));
        book.set_related("reviews", Related::Many(vec![]));

        assert_eq!(
            book.to_json(),
            json!({
                "id": 1,
                "title": "Pastoralia",
                "author": {"id": 1, "last_name": "Saunders"},
                "reviews": []
            })
        );
        assert_eq!(book.one("author").and_then(|a| a.get("last_name")), Some(&json!("Saunders")));
        assert_eq!(book.many("reviews").map(<[Row]>::len), Some(0));
    }
}
