//! Store adapters and the decorators stacked on top of them.
//!
//! Decorators compose by nesting, innermost first:
//!
//! ```text
//! LoggingStore::new(MetricsStore::new(PgStore, metrics), clock)
//! ```

mod logging;
mod metrics;
mod postgres;

pub use logging::{LogContext, LoggingStore};
pub use metrics::MetricsStore;
pub use postgres::{PgStore, StoreSettings};
