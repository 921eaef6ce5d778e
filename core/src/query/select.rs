use core::fmt::Write;
use std::sync::{Arc, LazyLock};

use regex::{NoExpand, Regex};
use serde_json::Value;

use crate::conditions::{Conditions, conditions_sql, where_sql};
use crate::dialect::Dialect;
use crate::error::{RelqError, Result};
use crate::options::Order;
use crate::relation::{Relationship, RelationshipTree, Via};
use crate::schema::{Registry, TableDef};

use super::{FieldSelection, JOIN_SEPARATOR};

static TABLE_MACRO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\$table").expect("valid table macro pattern"));

/// Everything needed to render one SELECT.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub table: Arc<TableDef>,
    pub fields: FieldSelection,
    pub conditions: Conditions,
    /// pre-rendered clauses AND-ed onto the WHERE
    pub filters: Vec<String>,
    /// a non-empty tree switches to the aliased join form
    pub relationships: RelationshipTree,
    pub order: Option<Order>,
    pub limit: Option<u64>,
    pub page: Option<u64>,
}

impl SelectQuery {
    pub fn new(table: Arc<TableDef>) -> Self {
        Self {
            table,
            fields: FieldSelection::All,
            conditions: Conditions::default(),
            filters: Vec::new(),
            relationships: Vec::new(),
            order: None,
            limit: None,
            page: None,
        }
    }

    pub fn fields(mut self, fields: FieldSelection) -> Self {
        self.fields = fields;
        self
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn filter(mut self, clause: impl Into<String>) -> Self {
        self.filters.push(clause.into());
        self
    }

    pub fn relationships(mut self, relationships: RelationshipTree) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn order(mut self, order: Option<Order>) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn page(mut self, page: Option<u64>) -> Self {
        self.page = page;
        self
    }

    /// Whether result columns are `alias:@:column` prefixed.
    pub fn is_join(&self) -> bool {
        !self.relationships.is_empty() && !self.conditions.is_raw()
    }
}

/// Renders a SELECT.
///
/// Raw conditions bypass everything else. A non-empty relationship tree
/// produces the join form: every hasOne edge (recursively) becomes a JOIN and
/// every column is aliased `<alias>:@:<column>` so the row can be split again.
pub fn compile_select(
    registry: &Registry,
    dialect: Dialect,
    query: &SelectQuery,
) -> Result<String> {
    let def = &query.table;

    if let Conditions::Raw { template, params } = &query.conditions {
        return compile_raw(dialect, def.table(), template, params);
    }

    let mut sql = String::from("SELECT ");

    if query.is_join() {
        let mut columns = Vec::new();
        push_columns(dialect, def, def.table(), &query.fields, &mut columns);
        let mut joins = String::new();
        let mut pivots = Vec::new();
        collect_joins(
            registry,
            dialect,
            &query.relationships,
            &query.fields,
            &mut columns,
            &mut joins,
            &mut pivots,
        )?;

        // hasMany sub-fetches are keyed on local columns that a field
        // filter may have dropped
        for (qualifier, key) in pivots {
            let alias = format!("{qualifier}{JOIN_SEPARATOR}{key}");
            if !columns.iter().any(|(a, _)| *a == alias) {
                columns.push((alias, column_sql(dialect, &qualifier, &key)));
            }
        }

        let list = columns.iter().map(|(_, c)| c.as_str()).collect::<Vec<_>>();
        sql.push_str(&list.join(", "));
        let _ = write!(sql, " FROM {}", dialect.escape_alias(def.table()));
        sql.push_str(&joins);
    } else {
        let list = query
            .fields
            .filter(def.fields(), def.primary_key())
            .into_iter()
            .map(|f| dialect.escape_alias(f))
            .collect::<Vec<_>>();
        sql.push_str(&list.join(", "));
        let _ = write!(sql, " FROM {}", dialect.escape_alias(def.table()));
    }

    sql.push_str(&where_sql(dialect, def.table(), &query.conditions, &query.filters)?);
    if let Some(order) = &query.order {
        sql.push_str(&order.to_sql(dialect, def.table()));
    }
    sql.push_str(&limit_sql(query.limit, query.page));
    Ok(sql)
}

fn column_sql(dialect: Dialect, qualifier: &str, field: &str) -> String {
    format!(
        "{}.{} AS {}",
        dialect.escape_alias(qualifier),
        dialect.escape_alias(field),
        dialect.escape_alias(&format!("{qualifier}{JOIN_SEPARATOR}{field}"))
    )
}

fn push_columns(
    dialect: Dialect,
    def: &TableDef,
    qualifier: &str,
    selection: &FieldSelection,
    columns: &mut Vec<(String, String)>,
) {
    for field in selection.filter(def.fields(), def.primary_key()) {
        columns.push((
            format!("{qualifier}{JOIN_SEPARATOR}{field}"),
            column_sql(dialect, qualifier, field),
        ));
    }
}

fn collect_joins(
    registry: &Registry,
    dialect: Dialect,
    tree: &[Relationship],
    selection: &FieldSelection,
    columns: &mut Vec<(String, String)>,
    joins: &mut String,
    pivots: &mut Vec<(String, String)>,
) -> Result<()> {
    for rel in tree {
        if !rel.is_has_one() {
            pivots.push((rel.local.table.clone(), rel.local.key.clone()));
            continue;
        }
        let foreign = registry.lookup(&rel.foreign.table)?;
        push_columns(dialect, &foreign, &rel.foreign.alias, selection, columns);
        joins.push_str(&join_sql(dialect, rel, &foreign)?);
        collect_joins(
            registry,
            dialect,
            &rel.relationships,
            selection,
            columns,
            joins,
            pivots,
        )?;
    }
    Ok(())
}

/// Renders ` LEFT|INNER JOIN ... AS ... ON ...` for a hasOne edge. Foreign
/// conditions go into the ON clause so an optional join stays optional.
pub fn join_sql(dialect: Dialect, rel: &Relationship, foreign: &TableDef) -> Result<String> {
    let join_type = if rel.optional { "LEFT" } else { "INNER" };
    let mut sql = format!(
        " {join_type} JOIN {} AS {} ON {}.{} = {}.{}",
        dialect.escape_alias(foreign.table()),
        dialect.escape_alias(&rel.foreign.alias),
        dialect.escape_alias(&rel.local.table),
        dialect.escape_alias(&rel.local.key),
        dialect.escape_alias(&rel.foreign.alias),
        dialect.escape_alias(&rel.foreign.key),
    );
    for clause in conditions_sql(dialect, &rel.foreign.alias, &rel.conditions)? {
        let _ = write!(sql, " AND {clause}");
    }
    Ok(sql)
}

/// ` LIMIT n` or ` LIMIT offset, n`. A page without a limit is ignored.
pub fn limit_sql(limit: Option<u64>, page: Option<u64>) -> String {
    match (limit, page) {
        (None, _) => String::new(),
        (Some(limit), Some(page)) if page > 0 => {
            format!(" LIMIT {}, {limit}", (page - 1).saturating_mul(limit))
        }
        (Some(limit), _) => format!(" LIMIT {limit}"),
    }
}

/// Substitutes `$table` with the escaped table name and each `?` with the
/// next escaped parameter, left to right.
pub fn compile_raw(
    dialect: Dialect,
    table: &str,
    template: &str,
    params: &[Value],
) -> Result<String> {
    let escaped = dialect.escape_alias(table);
    let template = TABLE_MACRO.replace_all(template, NoExpand(&escaped));

    let mut sql = String::with_capacity(template.len());
    let mut params = params.iter();
    for c in template.chars() {
        if c == '?' {
            let value = params.next().ok_or_else(|| {
                RelqError::validation("raw SQL has more placeholders than parameters")
            })?;
            sql.push_str(&dialect.escape_literal(value));
        } else {
            sql.push(c);
        }
    }
    if params.next().is_some() {
        return Err(RelqError::validation(
            "raw SQL has more parameters than placeholders",
        ));
    }
    Ok(sql)
}

/// WHERE clause restricting `qualifier.key` to the rows a bridge table links
/// to `value`.
pub fn via_filter(
    dialect: Dialect,
    qualifier: &str,
    key: &str,
    via: &Via,
    value: &Value,
) -> String {
    let bridge = dialect.escape_alias(&via.table);
    format!(
        "{}.{} IN (SELECT {bridge}.{} FROM {bridge} WHERE {bridge}.{} = {})",
        dialect.escape_alias(qualifier),
        dialect.escape_alias(key),
        dialect.escape_alias(&via.foreign),
        dialect.escape_alias(&via.local),
        dialect.escape_literal(value),
    )
}
