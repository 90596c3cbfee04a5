//! User account service library modules.
//!
//! The domain owns the account model, the store-access ports and the
//! transactional service. Outbound adapters implement the store against
//! PostgreSQL and decorate it with metrics and logging; inbound adapters
//! expose the service over HTTP.

pub mod config;
pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::TrackRequests;
