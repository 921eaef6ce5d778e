//! Query Compiler: SELECT/INSERT/UPDATE/DELETE text synthesis.
//!
//! Statements are rendered with every value inlined as an escaped literal,
//! so the backend receives plain SQL text with no bind parameters.

mod select;
mod write;

pub use select::*;
pub use write::*;

/// Separates the join alias from the column name in joined result columns,
/// e.g. `author:@:last_name`.
pub const JOIN_SEPARATOR: &str = ":@:";

/// Column filtering for reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    #[default]
    All,
    /// keep columns ending with one of these names; the primary key is always kept
    Include(Vec<String>),
    /// drop columns ending with any of these names
    Exclude(Vec<String>),
}

impl FieldSelection {
    /// Builds a selection from `include`/`exclude` options. `include` wins when
    /// both are given.
    pub fn from_options(include: Option<&[String]>, exclude: Option<&[String]>) -> Self {
        match (include, exclude) {
            (Some(include), _) => Self::Include(include.to_vec()),
            (None, Some(exclude)) => Self::Exclude(exclude.to_vec()),
            (None, None) => Self::All,
        }
    }

    /// Applies the selection to one table's columns.
    pub fn filter<'a>(&self, fields: &'a [String], primary_key: &str) -> Vec<&'a str> {
        fields
            .iter()
            .map(String::as_str)
            .filter(|field| match self {
                Self::All => true,
                Self::Include(names) => {
                    *field == primary_key || names.iter().any(|n| field.ends_with(n.as_str()))
                }
                Self::Exclude(names) => !names.iter().any(|n| field.ends_with(n.as_str())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<String> {
        ["id", "author_id", "title", "release_date"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn include_keeps_primary_key_and_suffix_matches() {
        let fields = fields();
        let selection = FieldSelection::Include(vec!["title".into()]);
        assert_eq!(selection.filter(&fields, "id"), ["id", "title"]);

        let selection = FieldSelection::Include(vec!["_id".into()]);
        assert_eq!(selection.filter(&fields, "id"), ["id", "author_id"]);
    }

    #[test]
    fn exclude_drops_suffix_matches() {
        let fields = fields();
        let selection = FieldSelection::Exclude(vec!["date".into(), "title".into()]);
        assert_eq!(selection.filter(&fields, "id"), ["id", "author_id"]);
    }
}
