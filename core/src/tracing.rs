//! Tracing utilities for query and write observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a tracing event with the SQL text and parameter count.
///
/// Queries issued with the `debug` option log at info level, everything else
/// at debug level.
///
/// ```ignore
/// relq_trace_query!(&sql, params.len(), options.debug);
/// ```
#[macro_export]
macro_rules! relq_trace_query {
    ($sql:expr, $param_count:expr, $debug:expr) => {
        #[cfg(feature = "tracing")]
        {
            if $debug {
                tracing::info!(sql = %$sql, params = $param_count, "relq.query");
            } else {
                tracing::debug!(sql = %$sql, params = $param_count, "relq.query");
            }
        }
    };
    ($sql:expr, $param_count:expr) => {
        $crate::relq_trace_query!($sql, $param_count, false)
    };
}

/// Emit a debug-level tracing event for write pipeline lifecycle steps.
///
/// ```ignore
/// relq_trace_write!("update_fallback", "book");
/// ```
#[macro_export]
macro_rules! relq_trace_write {
    ($event:literal, $table:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(event = $event, table = %$table, "relq.write");
    };
}

/// Emit a trace-level event for hydration fan-out.
#[macro_export]
macro_rules! relq_trace_hydrate {
    ($relationship:expr, $table:expr) => {
        #[cfg(feature = "tracing")]
        tracing::trace!(relationship = %$relationship, table = %$table, "relq.hydrate");
    };
}
