//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **store**: PostgreSQL store over `sqlx` plus logging and metrics
//!   decorators
//! - **identifier**: random identifier generation
//! - **metrics**: Prometheus-backed metrics exporters (feature-gated)
//!
//! Adapters are thin translators between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod identifier;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod store;
