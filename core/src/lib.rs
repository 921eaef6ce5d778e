pub mod backend;
pub mod conditions;
pub mod dialect;
pub mod error;
pub mod options;
pub mod query;
pub mod relation;
pub mod row;
pub mod schema;
pub mod tracing;

// Re-export key types and traits
pub use backend::{Backend, Execution, RowStream, WriteResult};
pub use conditions::{CompareOp, Comparison, Conditions, FieldConditions, Predicate};
pub use dialect::{Conflict, Dialect};
pub use error::{BackendError, RelqError, Result};
pub use options::{
    Direction, OneOrMany, Order, PutOptions, QueryOptions, RelationshipSelector,
    WriteStreamOptions,
};
pub use query::{FieldSelection, JOIN_SEPARATOR, SelectQuery};
pub use relation::{
    Depth, Endpoint, ForeignEndpoint, Relationship, RelationshipKind, RelationshipSpec,
    RelationshipTree, Via,
};
pub use row::{Behavior, Constructor, FieldMap, Related, Row, RowShape};
pub use schema::{Registry, TableDef, TableSpec};
