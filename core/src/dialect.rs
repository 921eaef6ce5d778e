//! SQL dialects: identifier/literal escaping and backend error classification.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::BackendError;

/// SQL dialect spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    SQLite,
    MySQL,
}

/// Outcome of classifying a failed INSERT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// A unique or primary key already holds the value. `key` is the candidate
    /// column that collided, when it could be identified.
    Duplicate { key: Option<String> },
    /// A required column had no value, which happens when a partial row that
    /// carries its key is written with `put`.
    IncompleteRow,
}

static MYSQL_DUP_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"for key '(?:[^'.]+\.)?([^'.]+)'").expect("valid mysql duplicate-key pattern")
});

static SQLITE_UNIQUE_COLUMNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"UNIQUE constraint failed: (.+)$").expect("valid sqlite unique pattern")
});

static SQLITE_LEGACY_COLUMNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"columns? (.+?) (?:is|are) not unique").expect("valid sqlite legacy pattern")
});

impl Dialect {
    /// Quotes an identifier with backticks. Dotted names are quoted per
    /// segment, so `book.title` becomes `` `book`.`title` ``.
    pub fn escape_identifier(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 4);
        for (i, part) in name.split('.').enumerate() {
            if i > 0 {
                out.push('.');
            }
            push_quoted_identifier(part, &mut out);
        }
        out
    }

    /// Quotes a single identifier without splitting on dots.
    pub fn escape_alias(&self, alias: &str) -> String {
        let mut out = String::with_capacity(alias.len() + 2);
        push_quoted_identifier(alias, &mut out);
        out
    }

    /// Renders a value as an inline SQL literal.
    pub fn escape_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match self {
                Dialect::SQLite => if *b { "1" } else { "0" }.to_string(),
                Dialect::MySQL => if *b { "true" } else { "false" }.to_string(),
            },
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.escape_string(s),
            Value::Array(items) => items
                .iter()
                .map(|v| self.escape_literal(v))
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => self.escape_string(&value.to_string()),
        }
    }

    fn escape_string(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        match self {
            Dialect::SQLite => {
                for c in s.chars() {
                    if c == '\'' {
                        out.push('\'');
                    }
                    out.push(c);
                }
            }
            Dialect::MySQL => {
                for c in s.chars() {
                    match c {
                        '\0' => out.push_str("\\0"),
                        '\x08' => out.push_str("\\b"),
                        '\t' => out.push_str("\\t"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\x1a' => out.push_str("\\Z"),
                        '"' => out.push_str("\\\""),
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(c),
                    }
                }
            }
        }
        out.push('\'');
        out
    }

    /// Whether `UPDATE`/`DELETE` accept a trailing `LIMIT`.
    ///
    /// Stock SQLite builds do not, so single-row mutations go through a
    /// `rowid` subselect instead.
    pub const fn supports_mutation_limit(&self) -> bool {
        matches!(self, Dialect::MySQL)
    }

    /// Statement body for an INSERT with no columns.
    pub const fn empty_insert(&self) -> &'static str {
        match self {
            Dialect::SQLite => "DEFAULT VALUES",
            Dialect::MySQL => "() VALUES ()",
        }
    }

    /// Classifies a failed INSERT.
    ///
    /// `candidate_keys[0]` must be the table's primary key; any further entries
    /// are additional unique keys the caller is willing to update by.
    pub fn classify_conflict(
        &self,
        err: &BackendError,
        candidate_keys: &[String],
    ) -> Option<Conflict> {
        match self {
            Dialect::MySQL => classify_mysql(err, candidate_keys),
            Dialect::SQLite => classify_sqlite(err, candidate_keys),
        }
    }
}

fn push_quoted_identifier(part: &str, out: &mut String) {
    out.push('`');
    for c in part.chars() {
        if c == '`' {
            out.push('`');
        }
        out.push(c);
    }
    out.push('`');
}

fn classify_mysql(err: &BackendError, candidate_keys: &[String]) -> Option<Conflict> {
    match err.code.as_deref() {
        Some("ER_NO_DEFAULT_FOR_FIELD") => Some(Conflict::IncompleteRow),
        Some("ER_DUP_ENTRY") => {
            let index = MYSQL_DUP_KEY
                .captures(&err.message)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str());
            let key = match index {
                Some("PRIMARY") => candidate_keys.first().cloned(),
                Some(name) => candidate_keys.iter().find(|k| k.as_str() == name).cloned(),
                None => None,
            };
            Some(Conflict::Duplicate { key })
        }
        _ => None,
    }
}

fn classify_sqlite(err: &BackendError, candidate_keys: &[String]) -> Option<Conflict> {
    let code = err.code.as_deref().unwrap_or_default();
    let message = err.message.as_str();

    if code == "SQLITE_CONSTRAINT_NOTNULL" || message.contains("NOT NULL constraint failed") {
        return Some(Conflict::IncompleteRow);
    }

    if message.contains("PRIMARY KEY must be unique") {
        return Some(Conflict::Duplicate {
            key: candidate_keys.first().cloned(),
        });
    }

    let columns = SQLITE_UNIQUE_COLUMNS
        .captures(message)
        .or_else(|| SQLITE_LEGACY_COLUMNS.captures(message))
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split(',')
                .map(|col| col.trim().rsplit('.').next().unwrap_or_default().to_string())
                .collect::<Vec<_>>()
        });

    let is_duplicate = matches!(
        code,
        "SQLITE_CONSTRAINT_PRIMARYKEY" | "SQLITE_CONSTRAINT_UNIQUE"
    ) || columns.is_some();

    if !is_duplicate {
        return None;
    }

    let key = match columns {
        Some(columns) => candidate_keys
            .iter()
            .find(|k| columns.iter().any(|c| c == *k))
            .cloned(),
        None if code == "SQLITE_CONSTRAINT_PRIMARYKEY" => candidate_keys.first().cloned(),
        None => None,
    };
    Some(Conflict::Duplicate { key })
}
