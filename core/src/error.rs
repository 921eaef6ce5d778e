use thiserror::Error;

/// Failure reported by a backend driver.
///
/// `code` carries the driver's native error code name (for example
/// `ER_DUP_ENTRY` or `SQLITE_CONSTRAINT_PRIMARYKEY`) so dialects can classify
/// the failure without depending on the driver crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelqError {
    /// Unknown table, or a relationship pointing at an unregistered table
    #[error("No table registered with the name `{0}`")]
    NotRegistered(String),

    /// Malformed condition, ordering or relationship input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A write collided with an existing row and could not fall back to an update
    #[error(
        "Duplicate key conflict{}: {source}",
        key.as_deref().map(|k| format!(" on `{k}`")).unwrap_or_default()
    )]
    DuplicateKey {
        key: Option<String>,
        #[source]
        source: BackendError,
    },

    /// Error executing a query
    #[error("Execution error: {0}")]
    Execution(#[from] BackendError),

    /// A hasMany sub-fetch failed
    #[error("Failed to resolve relationship `{relationship}`: {source}")]
    Relationship {
        relationship: String,
        #[source]
        source: Box<RelqError>,
    },
}

impl RelqError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true for errors the write stream may downgrade to a `dupe` event.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

/// Result type for relq operations
pub type Result<T> = std::result::Result<T, RelqError>;
