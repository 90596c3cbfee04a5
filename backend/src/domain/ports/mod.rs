//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod identifier_generator;
mod query_metrics;
mod store;
mod user_account_service;

#[cfg(test)]
pub use identifier_generator::MockIdentifierGenerator;
pub use identifier_generator::IdentifierGenerator;
#[cfg(test)]
pub use query_metrics::MockQueryMetrics;
pub use query_metrics::{
    NoOpQueryMetrics, OPERATION_BEGIN, OPERATION_CLOSE, OPERATION_COMMIT, OPERATION_PREPARE,
    OPERATION_ROLLBACK, OPERATION_UNKNOWN, QueryMetrics, statement_operation,
};
pub use store::{
    DbInfo, Deadline, IsolationLevel, Preparer, Row, Statement, Store, StoreError, Transaction,
    TxBeginner, TxOptions, Value,
};
#[cfg(test)]
pub use user_account_service::MockUserAccountService;
pub use user_account_service::UserAccountService;
