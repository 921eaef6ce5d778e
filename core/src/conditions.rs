//! Condition mini-language and its translation into WHERE-clause fragments.
//!
//! Condition values arrive in one of four shapes (scalar, operator object,
//! scalar list, operator-object list). They are resolved once into a
//! [`Predicate`] so rendering never has to guess at the shape again.

use serde::Deserialize;
use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{RelqError, Result};

/// Comparison operator of an operator-object predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl CompareOp {
    pub fn parse(op: &str) -> Result<Self> {
        let op = match op.trim().to_ascii_uppercase().as_str() {
            "=" | "==" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "LIKE" => Self::Like,
            "NOT LIKE" => Self::NotLike,
            other => return Err(RelqError::validation(format!("unsupported operator `{other}`"))),
        };
        Ok(op)
    }

    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

/// An operator applied to a single value, e.g. `age >= 40`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub op: CompareOp,
    pub value: Value,
}

impl Comparison {
    pub fn new(op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            op,
            value: value.into(),
        }
    }
}

/// Resolved predicate for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field = value`
    Equals(Value),
    /// `field <op> value`
    Compare(Comparison),
    /// `field IN (values)`
    In(Vec<Value>),
    /// every comparison AND-joined, e.g. a range
    All(Vec<Comparison>),
}

impl TryFrom<Value> for Predicate {
    type Error = RelqError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(RelqError::validation("condition list must not be empty"));
                }
                if items.iter().all(Value::is_object) {
                    items
                        .into_iter()
                        .map(comparison_from_value)
                        .collect::<Result<Vec<_>>>()
                        .map(Predicate::All)
                } else if items.iter().any(|v| v.is_object() || v.is_array()) {
                    Err(RelqError::validation(
                        "condition lists must hold only scalars or only operator objects",
                    ))
                } else {
                    Ok(Predicate::In(items))
                }
            }
            Value::Object(_) => {
                let comparison = comparison_from_value(value)?;
                if comparison.op == CompareOp::Eq {
                    Ok(Predicate::Equals(comparison.value))
                } else {
                    Ok(Predicate::Compare(comparison))
                }
            }
            scalar => Ok(Predicate::Equals(scalar)),
        }
    }
}

fn comparison_from_value(value: Value) -> Result<Comparison> {
    let Value::Object(mut map) = value else {
        return Err(RelqError::validation("expected an operator object"));
    };
    let op = match map.remove("op").or_else(|| map.remove("operation")) {
        Some(Value::String(op)) => CompareOp::parse(&op)?,
        Some(other) => {
            return Err(RelqError::validation(format!(
                "operator must be a string, got {other}"
            )));
        }
        None => CompareOp::Eq,
    };
    let value = map
        .remove("value")
        .ok_or_else(|| RelqError::validation("operator object is missing `value`"))?;
    if value.is_object() || value.is_array() {
        return Err(RelqError::validation("operator value must be a scalar"));
    }
    Ok(Comparison { op, value })
}

macro_rules! predicate_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Predicate {
            fn from(value: $ty) -> Self {
                Predicate::Equals(value.into())
            }
        })*
    };
}

predicate_from_scalar!(i32, i64, u32, u64, f64, bool, String, &str);

impl From<Comparison> for Predicate {
    fn from(value: Comparison) -> Self {
        Predicate::Compare(value)
    }
}

/// Field → predicate pairs, AND-joined when rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldConditions(Vec<(String, Predicate)>);

impl FieldConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.0.iter().map(|(f, p)| (f.as_str(), p))
    }

    /// Sets the predicate for a field, replacing any earlier one.
    pub fn insert(&mut self, field: impl Into<String>, predicate: Predicate) {
        let field = field.into();
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = predicate,
            None => self.0.push((field, predicate)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Predicate> {
        self.0.iter().find(|(f, _)| f == field).map(|(_, p)| p)
    }
}

impl TryFrom<serde_json::Map<String, Value>> for FieldConditions {
    type Error = RelqError;

    fn try_from(map: serde_json::Map<String, Value>) -> Result<Self> {
        let mut out = FieldConditions::new();
        for (field, value) in map {
            out.insert(field, Predicate::try_from(value)?);
        }
        Ok(out)
    }
}

/// A query's condition set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Conditions {
    /// field predicates, AND-joined
    Fields(FieldConditions),
    /// AND-groups OR-joined
    AnyOf(Vec<FieldConditions>),
    /// `[template, params]` passthrough; `$table` and `?` are substituted
    Raw { template: String, params: Vec<Value> },
}

impl Default for Conditions {
    fn default() -> Self {
        Conditions::Fields(FieldConditions::new())
    }
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(template: impl Into<String>, params: impl IntoIterator<Item = Value>) -> Self {
        Conditions::Raw {
            template: template.into(),
            params: params.into_iter().collect(),
        }
    }

    pub fn any_of(groups: impl IntoIterator<Item = Conditions>) -> Result<Self> {
        groups
            .into_iter()
            .map(|group| match group {
                Conditions::Fields(fields) => Ok(fields),
                _ => Err(RelqError::validation("OR groups must be plain field conditions")),
            })
            .collect::<Result<Vec<_>>>()
            .map(Conditions::AnyOf)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Conditions::Fields(fields) => fields.is_empty(),
            Conditions::AnyOf(groups) => groups.iter().all(FieldConditions::is_empty),
            Conditions::Raw { .. } => false,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Conditions::Raw { .. })
    }

    /// Adds a predicate. On an OR set it is added to every group.
    pub fn with(mut self, field: impl Into<String>, predicate: impl Into<Predicate>) -> Self {
        let field = field.into();
        let predicate = predicate.into();
        match &mut self {
            Conditions::Fields(fields) => fields.insert(field, predicate),
            Conditions::AnyOf(groups) => {
                for group in groups {
                    group.insert(field.clone(), predicate.clone());
                }
            }
            Conditions::Raw { .. } => {}
        }
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Equals(value.into()))
    }

    pub fn compare(self, field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Compare(Comparison::new(op, value)))
    }

    pub fn is_in<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.with(field, Predicate::In(values.into_iter().map(Into::into).collect()))
    }

    /// `low <= field <= high`
    pub fn between(
        self,
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.with(
            field,
            Predicate::All(vec![
                Comparison::new(CompareOp::Gte, low),
                Comparison::new(CompareOp::Lte, high),
            ]),
        )
    }

    /// Merges another plain condition set in; its predicates win on conflict.
    pub fn merged(self, other: &Conditions) -> Self {
        match other {
            Conditions::Fields(fields) => fields
                .iter()
                .fold(self, |acc, (f, p)| acc.with(f, p.clone())),
            _ => self,
        }
    }
}

impl TryFrom<Value> for Conditions {
    type Error = RelqError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Conditions::default()),
            Value::Object(map) => FieldConditions::try_from(map).map(Conditions::Fields),
            Value::Array(items) => {
                if let [Value::String(template), Value::Array(params)] = items.as_slice() {
                    return Ok(Conditions::Raw {
                        template: template.clone(),
                        params: params.clone(),
                    });
                }
                if let [Value::String(template)] = items.as_slice() {
                    return Ok(Conditions::Raw {
                        template: template.clone(),
                        params: Vec::new(),
                    });
                }
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => FieldConditions::try_from(map),
                        other => Err(RelqError::validation(format!(
                            "expected a condition object, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Conditions::AnyOf)
            }
            other => Err(RelqError::validation(format!(
                "conditions must be an object or array, got {other}"
            ))),
        }
    }
}

/// Renders one field's predicate. `qualifier` is the table (or join alias) the
/// field belongs to.
pub fn predicate_sql(
    dialect: Dialect,
    qualifier: &str,
    field: &str,
    predicate: &Predicate,
) -> Result<String> {
    let column = format!(
        "{}.{}",
        dialect.escape_alias(qualifier),
        dialect.escape_alias(field)
    );
    let sql = match predicate {
        Predicate::Equals(Value::Null) => format!("{column} IS NULL"),
        Predicate::Equals(value) => format!("{column} = {}", scalar_literal(dialect, value)?),
        Predicate::Compare(c) => comparison_sql(dialect, &column, c)?,
        Predicate::In(values) => {
            if values.is_empty() {
                return Err(RelqError::validation(format!("empty IN list for `{field}`")));
            }
            let list = values
                .iter()
                .map(|v| scalar_literal(dialect, v))
                .collect::<Result<Vec<_>>>()?;
            format!("{column} IN ({})", list.join(","))
        }
        Predicate::All(comparisons) => {
            if comparisons.is_empty() {
                return Err(RelqError::validation(format!("empty comparison list for `{field}`")));
            }
            comparisons
                .iter()
                .map(|c| comparison_sql(dialect, &column, c))
                .collect::<Result<Vec<_>>>()?
                .join(" AND ")
        }
    };
    Ok(sql)
}

fn comparison_sql(dialect: Dialect, column: &str, c: &Comparison) -> Result<String> {
    Ok(match (&c.value, c.op) {
        (Value::Null, CompareOp::Eq) => format!("{column} IS NULL"),
        (Value::Null, CompareOp::NotEq) => format!("{column} IS NOT NULL"),
        (value, op) => format!("{column} {} {}", op.as_sql(), scalar_literal(dialect, value)?),
    })
}

fn scalar_literal(dialect: Dialect, value: &Value) -> Result<String> {
    if value.is_object() || value.is_array() {
        return Err(RelqError::validation(format!(
            "condition value must be a scalar, got {value}"
        )));
    }
    Ok(dialect.escape_literal(value))
}

/// AND-joined clauses for a field condition set, without the `WHERE` keyword.
pub fn field_conditions_sql(
    dialect: Dialect,
    qualifier: &str,
    conditions: &FieldConditions,
) -> Result<Vec<String>> {
    conditions
        .iter()
        .map(|(field, predicate)| predicate_sql(dialect, qualifier, field, predicate))
        .collect()
}

/// Clauses for a whole condition set, to be AND-joined by the caller.
///
/// Raw conditions are whole statements and cannot be embedded.
pub fn conditions_sql(
    dialect: Dialect,
    qualifier: &str,
    conditions: &Conditions,
) -> Result<Vec<String>> {
    match conditions {
        Conditions::Fields(fields) => field_conditions_sql(dialect, qualifier, fields),
        Conditions::AnyOf(groups) => {
            let groups = groups
                .iter()
                .filter(|g| !g.is_empty())
                .map(|g| {
                    field_conditions_sql(dialect, qualifier, g)
                        .map(|c| format!("({})", c.join(" AND ")))
                })
                .collect::<Result<Vec<_>>>()?;
            if groups.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![format!("({})", groups.join(" OR "))])
            }
        }
        Conditions::Raw { .. } => Err(RelqError::validation(
            "raw SQL conditions cannot be combined with other clauses",
        )),
    }
}

/// Renders ` WHERE ...` for a condition set plus pre-rendered extra clauses.
///
/// Returns an empty string when there is nothing to filter on.
pub fn where_sql(
    dialect: Dialect,
    qualifier: &str,
    conditions: &Conditions,
    extra: &[String],
) -> Result<String> {
    let mut clauses = conditions_sql(dialect, qualifier, conditions)?;
    clauses.extend(extra.iter().cloned());

    if clauses.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(value: Value) -> Result<String> {
        let conditions = Conditions::try_from(value)?;
        where_sql(Dialect::MySQL, "user", &conditions, &[])
    }

    #[test]
    fn scalar_equality() {
        assert_eq!(
            render(json!({"id": 3})).unwrap(),
            " WHERE `user`.`id` = 3"
        );
    }

    #[test]
    fn operator_objects_accept_both_spellings() {
        assert_eq!(
            render(json!({"age": {"op": ">=", "value": 40}})).unwrap(),
            " WHERE `user`.`age` >= 40"
        );
        assert_eq!(
            render(json!({"age": {"operation": "<", "value": 60}})).unwrap(),
            " WHERE `user`.`age` < 60"
        );
    }

    #[test]
    fn scalar_lists_become_in() {
        assert_eq!(
            render(json!({"release_date": [2000, 1996]})).unwrap(),
            " WHERE `user`.`release_date` IN (2000,1996)"
        );
    }

    #[test]
    fn operator_lists_become_ranges() {
        assert_eq!(
            render(json!({"age": [{"op": ">=", "value": 40}, {"op": "<=", "value": 60}]})).unwrap(),
            " WHERE `user`.`age` >= 40 AND `user`.`age` <= 60"
        );
    }

    #[test]
    fn fields_are_and_joined_in_order() {
        assert_eq!(
            render(json!({"author_id": 3, "release_date": "2000"})).unwrap(),
            " WHERE `user`.`author_id` = 3 AND `user`.`release_date` = '2000'"
        );
    }

    #[test]
    fn or_groups() {
        assert_eq!(
            render(json!([{"first_name": "George"}, {"first_name": "Kelly", "age": 45}])).unwrap(),
            " WHERE ((`user`.`first_name` = 'George') \
             OR (`user`.`first_name` = 'Kelly' AND `user`.`age` = 45))"
        );
    }

    #[test]
    fn null_targets_use_is_null() {
        assert_eq!(render(json!({"age": null})).unwrap(), " WHERE `user`.`age` IS NULL");
        assert_eq!(
            render(json!({"age": {"op": "!=", "value": null}})).unwrap(),
            " WHERE `user`.`age` IS NOT NULL"
        );
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(render(json!({"age": {"op": ">"}})), Err(RelqError::Validation(_))));
        assert!(matches!(render(json!({"age": []})), Err(RelqError::Validation(_))));
        assert!(matches!(
            render(json!({"age": {"op": "; DROP", "value": 1}})),
            Err(RelqError::Validation(_))
        ));
        assert!(matches!(
            render(json!({"age": [1, {"op": ">", "value": 2}]})),
            Err(RelqError::Validation(_))
        ));
        assert!(matches!(render(json!("nope")), Err(RelqError::Validation(_))));
    }

    #[test]
    fn raw_pairs_are_detected() {
        let conditions =
            Conditions::try_from(json!(["SELECT * FROM $table WHERE id = ?", [1]])).unwrap();
        assert!(conditions.is_raw());
    }

    #[test]
    fn empty_conditions_render_nothing() {
        assert_eq!(render(json!({})).unwrap(), "");
        assert_eq!(render(Value::Null).unwrap(), "");
    }

    #[test]
    fn builder_matches_json_form() {
        let built = Conditions::new().eq("id", 3).between("age", 40, 60);
        let parsed = Conditions::try_from(json!({
            "id": 3,
            "age": [{"op": ">=", "value": 40}, {"op": "<=", "value": 60}]
        }))
        .unwrap();
        assert_eq!(built, parsed);
    }
}
