//! Per-call options: ordering, relationship selection, query/put/write-stream
//! settings.
//!
//! Every option type deserializes from the JSON shapes callers already use
//! and also offers builder methods.

use std::fmt::Write;

use serde::Deserialize;
use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{RelqError, Result};
use crate::relation::{Depth, RelationshipSpec};
use crate::schema::TableDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(direction: &str) -> Result<Self> {
        match direction.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(RelqError::validation(format!(
                "order direction must be ASC or DESC, got `{other}`"
            ))),
        }
    }

    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// `ORDER BY` columns. A column without a direction sorts ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Order(Vec<(String, Option<Direction>)>);

impl Order {
    /// One ascending column.
    pub fn by(column: impl Into<String>) -> Self {
        Self(vec![(column.into(), None)])
    }

    /// Several ascending columns, in priority order.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(|c| (c.into(), None)).collect())
    }

    pub fn asc(mut self, column: impl Into<String>) -> Self {
        self.0.push((column.into(), Some(Direction::Asc)));
        self
    }

    pub fn desc(mut self, column: impl Into<String>) -> Self {
        self.0.push((column.into(), Some(Direction::Desc)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders ` ORDER BY ...`. Undotted columns are qualified with
    /// `qualifier` so they stay unambiguous in joined statements.
    pub fn to_sql(&self, dialect: Dialect, qualifier: &str) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let mut sql = String::from(" ORDER BY ");
        for (i, (column, direction)) in self.0.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            if column.contains('.') {
                sql.push_str(&dialect.escape_identifier(column));
            } else {
                let _ = write!(
                    sql,
                    "{}.{}",
                    dialect.escape_alias(qualifier),
                    dialect.escape_alias(column)
                );
            }
            if let Some(direction) = direction {
                sql.push(' ');
                sql.push_str(direction.as_sql());
            }
        }
        sql
    }
}

impl TryFrom<Value> for Order {
    type Error = RelqError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Order::default()),
            Value::String(column) => Ok(Order::by(column)),
            Value::Array(columns) => columns
                .into_iter()
                .map(|c| match c {
                    Value::String(c) => Ok((c, None)),
                    other => Err(RelqError::validation(format!(
                        "order columns must be strings, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Order),
            Value::Object(map) => map
                .into_iter()
                .map(|(column, direction)| match direction {
                    Value::String(d) => Ok((column, Some(Direction::parse(&d)?))),
                    other => Err(RelqError::validation(format!(
                        "order direction must be a string, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Order),
            other => Err(RelqError::validation(format!("invalid order {other}"))),
        }
    }
}

/// Which relationships a read fulfils.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum RelationshipSelector {
    #[default]
    None,
    /// every declared relationship, unlimited depth
    All,
    /// every declared relationship to this depth; negative is unlimited
    Depth(i64),
    /// the named declared relationships
    Names(Vec<String>),
    /// relationships given with the query instead of the registration
    Inline(Vec<(String, RelationshipSpec)>),
}

impl RelationshipSelector {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn inline(relationships: impl IntoIterator<Item = (String, RelationshipSpec)>) -> Self {
        Self::Inline(relationships.into_iter().collect())
    }

    /// Picks the declarations to expand and how deep to go.
    ///
    /// `depth` (from `relationshipsDepth`) overrides the selector's own depth:
    /// negative is unlimited, zero turns relationships off.
    pub fn resolve(
        &self,
        table: &TableDef,
        depth: Option<i64>,
    ) -> Result<(Vec<(String, RelationshipSpec)>, Depth)> {
        let (specs, default_depth) = match self {
            Self::None => return Ok((Vec::new(), Depth::Levels(0))),
            Self::All => (table.relationships().to_vec(), Depth::Unlimited),
            Self::Depth(n) => (table.relationships().to_vec(), depth_from(*n)),
            Self::Names(names) => {
                let specs = names
                    .iter()
                    .map(|name| {
                        table
                            .relationship(name)
                            .map(|spec| (name.clone(), spec.clone()))
                            .ok_or_else(|| {
                                RelqError::validation(format!(
                                    "table `{}` has no relationship `{name}`",
                                    table.name()
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                (specs, Depth::Levels(1))
            }
            Self::Inline(specs) => (specs.clone(), Depth::Levels(1)),
        };
        Ok((specs, depth.map(depth_from).unwrap_or(default_depth)))
    }
}

fn depth_from(n: i64) -> Depth {
    if n < 0 {
        Depth::Unlimited
    } else {
        Depth::Levels(usize::try_from(n).unwrap_or(usize::MAX))
    }
}

impl TryFrom<Value> for RelationshipSelector {
    type Error = RelqError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Self::None),
            Value::Bool(true) => Ok(Self::All),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Depth)
                .ok_or_else(|| RelqError::validation(format!("invalid relationship depth {n}"))),
            Value::String(name) => Ok(Self::Names(vec![name])),
            Value::Array(names) => names
                .into_iter()
                .map(|n| match n {
                    Value::String(n) => Ok(n),
                    other => Err(RelqError::validation(format!(
                        "relationship names must be strings, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::Names),
            Value::Object(map) => map
                .into_iter()
                .map(|(name, spec)| Ok((name, RelationshipSpec::try_from(spec)?)))
                .collect::<Result<Vec<_>>>()
                .map(Self::Inline),
        }
    }
}

/// Read options for `get`, `get_one` and the read streams.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryOptions {
    pub limit: Option<u64>,
    /// 1-based; ignored without `limit`
    pub page: Option<u64>,
    #[serde(alias = "sort", alias = "orderBy")]
    pub order: Option<Order>,
    pub relationships: RelationshipSelector,
    pub relationships_depth: Option<i64>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// logs the generated SQL at info level
    pub debug: bool,
    pub single: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn relationships(mut self, relationships: RelationshipSelector) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn relationships_depth(mut self, depth: i64) -> Self {
        self.relationships_depth = Some(depth);
        self
    }

    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn single(mut self, single: bool) -> Self {
        self.single = single;
        self
    }
}

impl TryFrom<Value> for QueryOptions {
    type Error = RelqError;

    fn try_from(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| RelqError::validation(format!("invalid query options: {e}")))
    }
}

/// One column name or several.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Options for `put`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PutOptions {
    /// extra unique columns a duplicate conflict may be resolved by
    pub unique_key: Option<OneOrMany>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = Some(OneOrMany::One(key.into()));
        self
    }

    pub fn unique_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_key = Some(OneOrMany::Many(keys.into_iter().map(Into::into).collect()));
        self
    }

    /// Candidate conflict keys: the primary key first, then `unique_key`.
    pub fn candidate_keys(&self, primary_key: &str) -> Vec<String> {
        let mut keys = vec![primary_key.to_string()];
        if let Some(unique) = &self.unique_key {
            for key in unique.to_vec() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

/// Options for `create_write_stream`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteStreamOptions {
    /// report duplicate conflicts as `Dupe` events instead of failing
    pub ignore_dupes: bool,
    pub unique_key: Option<OneOrMany>,
}

impl WriteStreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_dupes(mut self, ignore: bool) -> Self {
        self.ignore_dupes = ignore;
        self
    }

    pub fn unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = Some(OneOrMany::One(key.into()));
        self
    }

    pub fn put_options(&self) -> PutOptions {
        PutOptions {
            unique_key: self.unique_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Registry, TableSpec};
    use serde_json::json;

    #[test]
    fn order_shapes() {
        let order = Order::try_from(json!("title")).unwrap();
        assert_eq!(order.to_sql(Dialect::SQLite, "book"), " ORDER BY `book`.`title`");

        let order = Order::try_from(json!(["release_date", "title"])).unwrap();
        assert_eq!(
            order.to_sql(Dialect::SQLite, "book"),
            " ORDER BY `book`.`release_date`, `book`.`title`"
        );

        let order =
            Order::try_from(json!({"release_date": "desc", "user.last_name": "asc"})).unwrap();
        assert_eq!(
            order.to_sql(Dialect::MySQL, "book"),
            " ORDER BY `book`.`release_date` DESC, `user`.`last_name` ASC"
        );

        assert!(Order::try_from(json!({"title": "sideways"})).is_err());
    }

    #[test]
    fn query_options_from_json() {
        let opts = QueryOptions::try_from(json!({
            "sort": {"title": "asc"},
            "limit": 2,
            "page": 3,
            "relationships": ["author"],
            "relationshipsDepth": 2,
            "include": ["title"]
        }))
        .unwrap();
        assert_eq!(opts.limit, Some(2));
        assert_eq!(opts.page, Some(3));
        assert_eq!(opts.order, Some(Order::default().asc("title")));
        assert_eq!(opts.relationships, RelationshipSelector::named(["author"]));
        assert_eq!(opts.relationships_depth, Some(2));

        let opts = QueryOptions::try_from(json!({"relationships": true, "orderBy": "id"})).unwrap();
        assert_eq!(opts.relationships, RelationshipSelector::All);
        assert_eq!(opts.order, Some(Order::by("id")));
    }

    #[test]
    fn selector_resolution() {
        let registry = Registry::new();
        let def = registry
            .register(
                "book",
                TableSpec::from_fields(["author_id"]).relationship(
                    "author",
                    RelationshipSpec::has_one("user", "id").local("author_id"),
                ),
            )
            .unwrap();

        let (specs, depth) = RelationshipSelector::All.resolve(&def, None).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(depth, Depth::Unlimited);

        let (_, depth) = RelationshipSelector::Depth(-1).resolve(&def, None).unwrap();
        assert_eq!(depth, Depth::Unlimited);

        let (_, depth) = RelationshipSelector::All.resolve(&def, Some(0)).unwrap();
        assert_eq!(depth, Depth::Levels(0));

        let (specs, depth) = RelationshipSelector::named(["author"]).resolve(&def, None).unwrap();
        assert_eq!(specs[0].0, "author");
        assert_eq!(depth, Depth::Levels(1));

        assert!(RelationshipSelector::named(["reviews"]).resolve(&def, None).is_err());
    }

    #[test]
    fn put_candidate_keys() {
        assert_eq!(PutOptions::new().candidate_keys("id"), ["id"]);
        assert_eq!(
            PutOptions::new().unique_keys(["title", "id"]).candidate_keys("id"),
            ["id", "title"]
        );
        let opts: WriteStreamOptions =
            serde_json::from_value(json!({"ignoreDupes": true, "uniqueKey": "title"})).unwrap();
        assert!(opts.ignore_dupes);
        assert_eq!(opts.put_options().candidate_keys("id"), ["id", "title"]);
    }
}
