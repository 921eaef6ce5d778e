//! Row Hydrator.
//!
//! Hydration runs in two phases. [`split_row`] partitions a joined row by its
//! `alias:@:` prefixes and attaches hasOne rows, all synchronously. Then
//! [`complete`] issues one sub-fetch per hasMany relationship (siblings run
//! concurrently) and recurses into the rows those fetches return.

use std::collections::HashMap;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, try_join, try_join_all};
use serde_json::Value;

use relq_core::error::{RelqError, Result};
use relq_core::query::{SelectQuery, compile_select, via_filter};
use relq_core::{Backend, FieldMap, JOIN_SEPARATOR, Related, Relationship, Row, TableDef};

use crate::database::Shared;

/// Splits a flat result row into the base row with its hasOne rows attached.
///
/// An empty tree means the row is not prefixed.
pub(crate) fn split_row<B: Backend>(
    db: &Shared<B>,
    def: &TableDef,
    flat: FieldMap,
    tree: &[Relationship],
) -> Result<Row> {
    if tree.is_empty() {
        return Ok(def.build_row(flat));
    }

    let mut parts: HashMap<String, FieldMap> = HashMap::new();
    for (column, value) in flat {
        if let Some((alias, field)) = column.split_once(JOIN_SEPARATOR) {
            parts
                .entry(alias.to_string())
                .or_default()
                .insert(field.to_string(), value);
        }
    }

    let base = parts.remove(def.table()).unwrap_or_default();
    let mut row = def.build_row(base);
    attach_has_one(db, &mut row, tree, &mut parts)?;
    Ok(row)
}

fn attach_has_one<B: Backend>(
    db: &Shared<B>,
    row: &mut Row,
    tree: &[Relationship],
    parts: &mut HashMap<String, FieldMap>,
) -> Result<()> {
    for rel in tree.iter().filter(|r| r.is_has_one()) {
        let fields = parts.remove(&rel.foreign.alias).unwrap_or_default();
        // an optional join that matched nothing yields an all-null block
        if fields.values().all(Value::is_null) {
            row.set_related(&rel.name, Related::One(None));
            continue;
        }
        let foreign = db.registry.lookup(&rel.foreign.table)?;
        let mut child = foreign.build_row(fields);
        attach_has_one(db, &mut child, &rel.relationships, parts)?;
        row.set_related(&rel.name, Related::One(Some(Box::new(child))));
    }
    Ok(())
}

/// Whether any hasMany edge is reachable through the joined part of the tree.
pub(crate) fn needs_fetch(tree: &[Relationship]) -> bool {
    tree.iter()
        .any(|r| !r.is_has_one() || needs_fetch(&r.relationships))
}

/// The value of a relationship's local endpoint. The endpoint may name a join
/// alias other than the row's own table.
fn local_value<'r>(
    row: &'r Row,
    qualifier: &str,
    tree: &[Relationship],
    rel: &Relationship,
) -> Option<&'r Value> {
    if rel.local.table == qualifier {
        return row.get(&rel.local.key);
    }
    find_alias(row, tree, &rel.local.table).and_then(|r| r.get(&rel.local.key))
}

fn find_alias<'r>(row: &'r Row, tree: &[Relationship], alias: &str) -> Option<&'r Row> {
    tree.iter().filter(|r| r.is_has_one()).find_map(|rel| {
        let child = row.one(&rel.name)?;
        if rel.foreign.alias == alias {
            Some(child)
        } else {
            find_alias(child, &rel.relationships, alias)
        }
    })
}

/// Fulfils every hasMany edge reachable from `row`.
///
/// Sibling fetches and hasOne subtrees run concurrently; the first error
/// drops the rest.
pub(crate) fn complete<'a, B: Backend>(
    db: &'a Shared<B>,
    mut row: Row,
    qualifier: &'a str,
    tree: &'a [Relationship],
) -> BoxFuture<'a, Result<Row>> {
    async move {
        let fetches = tree
            .iter()
            .filter(|rel| !rel.is_has_one())
            .map(|rel| {
                let value = local_value(&row, qualifier, tree, rel)
                    .cloned()
                    .unwrap_or(Value::Null);
                fetch_many(db, rel, value).map(move |rows| rows.map(|rows| (rel, rows)))
            })
            .collect::<Vec<_>>();

        let mut nested = Vec::new();
        for rel in tree.iter().filter(|r| r.is_has_one() && needs_fetch(&r.relationships)) {
            if let Some(Related::One(Some(child))) = row.take_related(&rel.name) {
                nested.push(
                    complete(db, *child, &rel.foreign.alias, &rel.relationships)
                        .map(move |child| child.map(|child| (rel, child))),
                );
            } else {
                row.set_related(&rel.name, Related::One(None));
            }
        }

        let (many, ones) = try_join(try_join_all(fetches), try_join_all(nested)).await?;
        for (rel, rows) in many {
            row.set_related(&rel.name, Related::Many(rows));
        }
        for (rel, child) in ones {
            row.set_related(&rel.name, Related::One(Some(Box::new(child))));
        }
        Ok(row)
    }
    .boxed()
}

/// One hasMany sub-fetch, keyed by the parent's local value.
async fn fetch_many<B: Backend>(
    db: &Shared<B>,
    rel: &Relationship,
    value: Value,
) -> Result<Vec<Row>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    relq_core::relq_trace_hydrate!(rel.name, rel.foreign.table);

    fetch_related(db, rel, value)
        .await
        .map_err(|source| RelqError::Relationship {
            relationship: rel.name.clone(),
            source: Box::new(source),
        })
}

async fn fetch_related<B: Backend>(
    db: &Shared<B>,
    rel: &Relationship,
    value: Value,
) -> Result<Vec<Row>> {
    if rel.conditions.is_raw() {
        return Err(RelqError::validation(
            "relationship conditions cannot be raw SQL",
        ));
    }
    let foreign = db.registry.lookup(&rel.foreign.table)?;
    let dialect = db.backend.dialect();

    let mut query = SelectQuery::new(foreign.clone()).relationships(rel.relationships.clone());
    query = match &rel.via {
        None => query.conditions(rel.conditions.clone().eq(rel.foreign.key.clone(), value)),
        Some(via) => query
            .conditions(rel.conditions.clone())
            .filter(via_filter(dialect, foreign.table(), &rel.foreign.key, via, &value)),
    };

    let sql = compile_select(&db.registry, dialect, &query)?;
    let rows = db.fetch(&sql, false).await?;
    hydrate_many(db, &foreign, rows, &rel.relationships).await
}

/// Hydrates a batch of rows, preserving their order.
pub(crate) async fn hydrate_many<B: Backend>(
    db: &Shared<B>,
    def: &TableDef,
    rows: Vec<FieldMap>,
    tree: &[Relationship],
) -> Result<Vec<Row>> {
    let rows = rows
        .into_iter()
        .map(|flat| split_row(db, def, flat, tree))
        .collect::<Result<Vec<_>>>()?;

    if !needs_fetch(tree) {
        return Ok(rows);
    }
    try_join_all(rows.into_iter().map(|row| complete(db, row, def.table(), tree))).await
}

/// Hydrates one streamed row.
pub(crate) async fn hydrate_one<B: Backend>(
    db: &Shared<B>,
    def: &TableDef,
    flat: FieldMap,
    tree: &[Relationship],
) -> Result<Row> {
    let row = split_row(db, def, flat, tree)?;
    if !needs_fetch(tree) {
        return Ok(row);
    }
    complete(db, row, def.table(), tree).await
}
