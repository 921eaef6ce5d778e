//! Conversions between SQLite storage values and JSON values.

use rusqlite::types::ValueRef;
use serde_json::{Number, Value};

use relq_core::FieldMap;

/// Converts one column value. Blobs become byte arrays, non-finite reals null.
pub fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(r) => Number::from_f64(r).map_or(Value::Null, Value::Number),
        ValueRef::Text(items) => Value::String(String::from_utf8_lossy(items).into_owned()),
        ValueRef::Blob(items) => Value::Array(items.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Reads a result row into a column-ordered field map.
pub fn row_to_fields(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<FieldMap> {
    let mut fields = FieldMap::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        fields.insert(column.clone(), from_value_ref(row.get_ref(i)?));
    }
    Ok(fields)
}
