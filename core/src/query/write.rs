use core::fmt::Write;

use serde_json::Value;

use crate::conditions::{Conditions, Predicate, predicate_sql, where_sql};
use crate::dialect::Dialect;
use crate::error::{RelqError, Result};
use crate::row::FieldMap;

use super::limit_sql;

/// Literal for a column value. Arrays and objects are stored as JSON text.
fn value_literal(dialect: Dialect, value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => {
            dialect.escape_literal(&Value::String(value.to_string()))
        }
        scalar => dialect.escape_literal(scalar),
    }
}

/// `INSERT INTO t (a, b) VALUES (1, 'x')`
pub fn compile_insert(dialect: Dialect, table: &str, row: &FieldMap) -> String {
    let mut sql = format!("INSERT INTO {}", dialect.escape_alias(table));
    if row.is_empty() {
        let _ = write!(sql, " {}", dialect.empty_insert());
        return sql;
    }
    let columns = row
        .keys()
        .map(|c| dialect.escape_alias(c))
        .collect::<Vec<_>>();
    let values = row
        .values()
        .map(|v| value_literal(dialect, v))
        .collect::<Vec<_>>();
    let _ = write!(sql, " ({}) VALUES ({})", columns.join(", "), values.join(", "));
    sql
}

/// UPDATE of at most one row, matched by equality on every key column.
pub fn compile_update(
    dialect: Dialect,
    table: &str,
    row: &FieldMap,
    key_columns: &[String],
) -> Result<String> {
    if row.is_empty() {
        return Err(RelqError::validation("cannot update with an empty row"));
    }
    if key_columns.is_empty() {
        return Err(RelqError::validation("update needs at least one key column"));
    }

    let mut matching = Vec::with_capacity(key_columns.len());
    for key in key_columns {
        let value = row.get(key).ok_or_else(|| {
            RelqError::validation(format!("row is missing key column `{key}`"))
        })?;
        matching.push(predicate_sql(
            dialect,
            table,
            key,
            &Predicate::Equals(value.clone()),
        )?);
    }
    let matching = matching.join(" AND ");

    let assignments = row
        .iter()
        .map(|(column, value)| {
            format!(
                "{} = {}",
                dialect.escape_alias(column),
                value_literal(dialect, value)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let escaped = dialect.escape_alias(table);
    let sql = if dialect.supports_mutation_limit() {
        format!("UPDATE {escaped} SET {assignments} WHERE {matching} LIMIT 1")
    } else {
        format!(
            "UPDATE {escaped} SET {assignments} WHERE rowid IN \
             (SELECT rowid FROM {escaped} WHERE {matching} LIMIT 1)"
        )
    };
    Ok(sql)
}

/// DELETE of the rows matching `conditions`, at most `limit` of them.
pub fn compile_delete(
    dialect: Dialect,
    table: &str,
    conditions: &Conditions,
    limit: Option<u64>,
) -> Result<String> {
    if conditions.is_raw() {
        return Err(RelqError::validation("raw SQL conditions are only valid for reads"));
    }
    let escaped = dialect.escape_alias(table);
    let filter = where_sql(dialect, table, conditions, &[])?;
    let limit = limit_sql(limit, None);

    let sql = if limit.is_empty() || dialect.supports_mutation_limit() {
        format!("DELETE FROM {escaped}{filter}{limit}")
    } else {
        format!("DELETE FROM {escaped} WHERE rowid IN (SELECT rowid FROM {escaped}{filter}{limit})")
    };
    Ok(sql)
}
