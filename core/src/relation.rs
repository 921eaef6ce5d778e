//! Relationship declarations, their canonical form, and depth expansion.
//!
//! A [`RelationshipSpec`] is what callers write. [`normalize`] turns it into a
//! [`Relationship`] with explicit endpoints, and [`expand`] walks the foreign
//! tables' own declarations to build the tree a query will fulfil.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conditions::Conditions;
use crate::error::{RelqError, Result};
use crate::schema::{Registry, TableDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    #[serde(rename = "hasOne")]
    HasOne,
    #[serde(rename = "hasMany")]
    HasMany,
}

/// Local side of a declaration: a bare key on the declaring table, or an
/// explicit endpoint (which may name another join alias).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LocalSpec {
    Key(String),
    Endpoint { table: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForeignSpec {
    pub table: String,
    pub key: String,
    #[serde(rename = "as", default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub conditions: Option<Conditions>,
}

/// Bridge table of a many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Via {
    pub table: String,
    /// bridge column holding the local value
    #[serde(alias = "localKey")]
    pub local: String,
    /// bridge column holding the foreign value
    #[serde(alias = "foreignKey")]
    pub foreign: String,
}

impl Via {
    pub fn new(
        table: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            local: local.into(),
            foreign: foreign.into(),
        }
    }
}

/// A relationship as declared.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelationshipSpec {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    #[serde(default)]
    pub local: Option<LocalSpec>,
    pub foreign: ForeignSpec,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub via: Option<Via>,
}

impl RelationshipSpec {
    fn with_kind(kind: RelationshipKind, table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind,
            local: None,
            foreign: ForeignSpec {
                table: table.into(),
                key: key.into(),
                alias: None,
                conditions: None,
            },
            optional: false,
            via: None,
        }
    }

    pub fn has_one(foreign_table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::with_kind(RelationshipKind::HasOne, foreign_table, foreign_key)
    }

    pub fn has_many(foreign_table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::with_kind(RelationshipKind::HasMany, foreign_table, foreign_key)
    }

    pub fn local(mut self, key: impl Into<String>) -> Self {
        self.local = Some(LocalSpec::Key(key.into()));
        self
    }

    pub fn local_endpoint(mut self, table: impl Into<String>, key: impl Into<String>) -> Self {
        self.local = Some(LocalSpec::Endpoint {
            table: table.into(),
            key: key.into(),
        });
        self
    }

    /// Join alias of the foreign table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.foreign.alias = Some(alias.into());
        self
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.foreign.conditions = Some(conditions);
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn via(mut self, via: Via) -> Self {
        self.via = Some(via);
        self
    }
}

impl TryFrom<Value> for RelationshipSpec {
    type Error = RelqError;

    fn try_from(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| RelqError::validation(format!("invalid relationship: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub table: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignEndpoint {
    /// registration name of the foreign table
    pub table: String,
    pub key: String,
    /// join alias; also the column prefix in joined rows
    pub alias: String,
}

/// Canonical relationship edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    pub local: Endpoint,
    pub foreign: ForeignEndpoint,
    pub optional: bool,
    pub via: Option<Via>,
    pub conditions: Conditions,
    /// nested edges, filled in by [`expand`]
    pub relationships: RelationshipTree,
}

impl Relationship {
    pub fn is_has_one(&self) -> bool {
        self.kind == RelationshipKind::HasOne
    }
}

pub type RelationshipTree = Vec<Relationship>;

/// How far [`expand`] walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Unlimited,
    Levels(usize),
}

impl Depth {
    fn descend(self) -> Option<Depth> {
        match self {
            Depth::Unlimited => Some(Depth::Unlimited),
            Depth::Levels(n) if n > 1 => Some(Depth::Levels(n - 1)),
            Depth::Levels(_) => None,
        }
    }

    fn is_zero(self) -> bool {
        self == Depth::Levels(0)
    }
}

/// Canonicalizes one declaration made on the table known as `parent` in the
/// statement being built. A missing `local` means "the relationship name is
/// the local column".
pub fn normalize(parent: &str, name: &str, spec: &RelationshipSpec) -> Relationship {
    let local = match &spec.local {
        None => Endpoint {
            table: parent.to_string(),
            key: name.to_string(),
        },
        Some(LocalSpec::Key(key)) => Endpoint {
            table: parent.to_string(),
            key: key.clone(),
        },
        Some(LocalSpec::Endpoint { table, key }) => Endpoint {
            table: table.clone(),
            key: key.clone(),
        },
    };

    Relationship {
        name: name.to_string(),
        kind: spec.kind,
        local,
        foreign: ForeignEndpoint {
            table: spec.foreign.table.clone(),
            key: spec.foreign.key.clone(),
            alias: spec
                .foreign
                .alias
                .clone()
                .unwrap_or_else(|| spec.foreign.table.clone()),
        },
        optional: spec.optional,
        via: spec.via.clone(),
        conditions: spec.foreign.conditions.clone().unwrap_or_default(),
        relationships: Vec::new(),
    }
}

/// Join aliases claimed within one statement.
#[derive(Debug, Default)]
struct AliasSet(Vec<String>);

impl AliasSet {
    fn seeded(base: &str) -> Self {
        Self(vec![base.to_string()])
    }

    fn claim(&mut self, wanted: &str) -> String {
        let mut alias = wanted.to_string();
        let mut n = 2;
        while self.0.contains(&alias) {
            alias = format!("{wanted}_{n}");
            n += 1;
        }
        self.0.push(alias.clone());
        alias
    }
}

struct Expander<'a> {
    registry: &'a Registry,
    /// visited (table, foreign table) pairs on the current path
    history: Vec<(String, String)>,
}

impl Expander<'_> {
    fn level(
        &mut self,
        table: &TableDef,
        qualifier: &str,
        specs: &[(String, RelationshipSpec)],
        depth: Depth,
        aliases: &mut AliasSet,
    ) -> Result<RelationshipTree> {
        let mut tree = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            let mut rel = normalize(qualifier, name, spec);
            let foreign = self.registry.lookup(&rel.foreign.table)?;

            if rel.via.is_some() && rel.is_has_one() {
                return Err(RelqError::validation(format!(
                    "relationship `{name}` on `{}` uses a bridge table but is not hasMany",
                    table.name()
                )));
            }

            // hasOne edges share the parent statement; hasMany edges become
            // their own query rooted at the foreign table.
            let mut fresh;
            let (child_qualifier, child_aliases) = if rel.is_has_one() {
                rel.foreign.alias = aliases.claim(&rel.foreign.alias);
                (rel.foreign.alias.clone(), &mut *aliases)
            } else {
                fresh = AliasSet::seeded(foreign.table());
                (foreign.table().to_string(), &mut fresh)
            };

            let pair = (table.name().to_string(), foreign.name().to_string());
            let next = depth.descend();
            if let Some(next) = next
                && !self.history.contains(&pair)
                && !foreign.relationships().is_empty()
            {
                self.history.push(pair);
                let nested = self.level(
                    &foreign,
                    &child_qualifier,
                    foreign.relationships(),
                    next,
                    child_aliases,
                );
                self.history.pop();
                rel.relationships = nested?;
            }
            tree.push(rel);
        }
        Ok(tree)
    }
}

/// Builds the relationship tree for a query on `table`.
///
/// `specs` is usually the table's own declarations, but may be an inline set
/// supplied with the query. Nested levels always use the foreign tables'
/// registered declarations. A `(table, foreign table)` pair already on the
/// current path keeps its edge but is not expanded again, so cyclic schemas
/// terminate.
pub fn expand(
    registry: &Registry,
    table: &TableDef,
    specs: &[(String, RelationshipSpec)],
    depth: Depth,
) -> Result<RelationshipTree> {
    if depth.is_zero() || specs.is_empty() {
        return Ok(Vec::new());
    }
    let mut expander = Expander {
        registry,
        history: Vec::new(),
    };
    let mut aliases = AliasSet::seeded(table.table());
    expander.level(table, table.table(), specs, depth, &mut aliases)
}
