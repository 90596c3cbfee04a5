//! Domain port surface for store call metrics.
//!
//! The metrics store decorator reports through this port so exporters stay
//! swappable and tests can assert on call ordering with a mock.

use std::time::Duration;

/// Operation label used for `prepare` calls.
pub const OPERATION_PREPARE: &str = "PREPARE";
/// Operation label used for `begin_tx` calls.
pub const OPERATION_BEGIN: &str = "BEGIN";
/// Operation label used for `commit` calls.
pub const OPERATION_COMMIT: &str = "COMMIT";
/// Operation label used for `rollback` calls.
pub const OPERATION_ROLLBACK: &str = "ROLLBACK";
/// Operation label used for statement `close` calls.
pub const OPERATION_CLOSE: &str = "CLOSE";
/// Operation label used when a statement verb cannot be determined.
pub const OPERATION_UNKNOWN: &str = "UNKNOWN";

/// Derive the operation label of a statement from its leading verb.
///
/// # Examples
/// ```
/// use accounts::domain::ports::statement_operation;
///
/// assert_eq!(statement_operation("  select 1"), "SELECT");
/// assert_eq!(statement_operation(""), "UNKNOWN");
/// ```
pub fn statement_operation(query: &str) -> String {
    query
        .split_whitespace()
        .next()
        .map_or_else(|| OPERATION_UNKNOWN.to_owned(), str::to_uppercase)
}

/// Recorder for store call latency and failures.
#[cfg_attr(test, mockall::automock)]
pub trait QueryMetrics: Send + Sync {
    /// Observe the duration of one call.
    fn observe_duration(&self, operation: &str, elapsed: Duration);

    /// Count one failed call.
    fn record_error(&self, operation: &str);

    /// Count one rollback request.
    fn record_rollback(&self);
}

/// Metrics recorder that discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpQueryMetrics;

impl QueryMetrics for NoOpQueryMetrics {
    fn observe_duration(&self, _operation: &str, _elapsed: Duration) {}

    fn record_error(&self, _operation: &str) {}

    fn record_rollback(&self) {}
}
