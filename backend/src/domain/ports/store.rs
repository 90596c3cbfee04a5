//! Transactional store access port.
//!
//! Four cooperating capabilities make up the surface every store adapter and
//! every instrumentation decorator implements:
//!
//! - [`Preparer`] creates prepared statements outside a transaction.
//! - [`TxBeginner`] starts transactions.
//! - [`Statement`] executes a prepared query.
//! - [`Transaction`] prepares statements bound to the transaction and ends it.
//!
//! Decorators wrap every child object they hand out, so a statement prepared
//! through a decorated preparer is itself decorated and instrumentation
//! reaches every object reachable from the outermost layer.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by store adapters.
    ///
    /// Decorators forward these unchanged; only the domain service maps them
    /// onto domain error codes.
    pub enum StoreError {
        /// The store could not be reached or a connection could not be acquired.
        Connection { message: String } => "store connection failed: {message}",
        /// The store rejected the statement text.
        Syntax { message: String } => "failed to prepare statement: {message}",
        /// Executing a statement failed.
        Query { message: String } => "query failed: {message}",
        /// Committing a transaction failed.
        Commit { message: String } => "commit failed: {message}",
        /// Rolling back a transaction failed.
        Rollback { message: String } => "rollback failed: {message}",
        /// The caller's deadline expired before the store answered.
        DeadlineExceeded => "store call exceeded its deadline",
        /// A row value could not be decoded into the requested type.
        Decode { message: String } => "failed to decode row: {message}",
        /// The transaction was already committed or rolled back.
        TransactionDone => "transaction has already been committed or rolled back",
        /// The statement was used after being closed.
        StatementClosed => "statement has already been closed",
    }
}

/// Positional statement argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Driver-independent result row with index-based typed accessors.
///
/// # Examples
/// ```
/// use accounts::domain::ports::{Row, Value};
///
/// let row = Row::new(vec![Value::Int(3), Value::from("jdoe")]);
/// assert_eq!(row.get_i64(0).unwrap(), 3);
/// assert_eq!(row.get_str(1).unwrap(), "jdoe");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<Value>,
}

impl Row {
    /// Build a row from decoded column values.
    pub fn new(columns: Vec<Value>) -> Self {
        Self { columns }
    }

    /// Raw column value.
    pub fn get(&self, index: usize) -> Result<&Value, StoreError> {
        self.columns
            .get(index)
            .ok_or_else(|| StoreError::decode(format!("column {index} is out of range")))
    }

    /// Column as a signed integer.
    pub fn get_i64(&self, index: usize) -> Result<i64, StoreError> {
        match self.get(index)? {
            Value::Int(value) => Ok(*value),
            other => Err(mismatch(index, "integer", other)),
        }
    }

    /// Column as borrowed text.
    pub fn get_str(&self, index: usize) -> Result<&str, StoreError> {
        match self.get(index)? {
            Value::Text(value) => Ok(value.as_str()),
            other => Err(mismatch(index, "text", other)),
        }
    }

    /// Column as a boolean.
    pub fn get_bool(&self, index: usize) -> Result<bool, StoreError> {
        match self.get(index)? {
            Value::Bool(value) => Ok(*value),
            other => Err(mismatch(index, "boolean", other)),
        }
    }
}

fn mismatch(index: usize, expected: &str, found: &Value) -> StoreError {
    StoreError::decode(format!("column {index} expected {expected}, found {found}"))
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// `READ COMMITTED`.
    ReadCommitted,
    /// `REPEATABLE READ`.
    RepeatableRead,
    /// `SERIALIZABLE`.
    Serializable,
}

/// Options applied when beginning a transaction.
///
/// The default keeps the store's configured isolation level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Isolation override, if any.
    pub isolation: Option<IsolationLevel>,
}

impl TxOptions {
    /// Options pinning the isolation level.
    pub const fn with_isolation(level: IsolationLevel) -> Self {
        Self {
            isolation: Some(level),
        }
    }
}

/// Point in time after which a store call must give up.
///
/// The caller chooses the deadline; adapters enforce it and decorators pass
/// it through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    pub const fn none() -> Self {
        Self(None)
    }

    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Drive `fut` to completion unless the deadline expires first.
    ///
    /// # Errors
    /// Returns [`StoreError::DeadlineExceeded`] when the deadline passes
    /// before `fut` completes.
    pub async fn run<F>(self, fut: F) -> Result<F::Output, StoreError>
    where
        F: Future,
    {
        match self.0 {
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| StoreError::deadline_exceeded()),
            None => Ok(fut.await),
        }
    }
}

/// Identity of the logical connection, used to label metrics and logs.
pub trait DbInfo: Send + Sync {
    /// Database name.
    fn db_name(&self) -> &str;

    /// Database user.
    fn db_user(&self) -> &str;
}

/// Creates prepared statements outside any transaction.
#[async_trait]
pub trait Preparer: DbInfo {
    /// Prepare `query` for execution.
    ///
    /// # Errors
    /// [`StoreError::Connection`] or [`StoreError::Syntax`].
    async fn prepare(&self, deadline: Deadline, query: &str)
    -> Result<Box<dyn Statement>, StoreError>;
}

/// Starts transactions.
#[async_trait]
pub trait TxBeginner: DbInfo {
    /// Begin a transaction.
    ///
    /// `deadline` also bounds the transaction's eventual commit.
    ///
    /// # Errors
    /// [`StoreError::Connection`] when no connection is available.
    async fn begin_tx(
        &self,
        deadline: Deadline,
        options: TxOptions,
    ) -> Result<Box<dyn Transaction>, StoreError>;
}

/// A prepared statement.
#[async_trait]
pub trait Statement: Send + Sync {
    /// Statement text as prepared.
    fn query(&self) -> &str;

    /// Execute without returning rows; yields the number of affected rows.
    async fn exec(&self, deadline: Deadline, args: &[Value]) -> Result<u64, StoreError>;

    /// Fetch at most one row.
    async fn query_row(&self, deadline: Deadline, args: &[Value])
    -> Result<Option<Row>, StoreError>;

    /// Fetch every row.
    async fn query_rows(&self, deadline: Deadline, args: &[Value]) -> Result<Vec<Row>, StoreError>;

    /// Release the statement.
    async fn close(&self) -> Result<(), StoreError>;
}

/// An in-flight transaction.
///
/// A transaction stays bound to the deadline it was begun with: `commit`
/// fails with [`StoreError::DeadlineExceeded`] once it passes. `rollback`
/// is not bound by it, so a transaction abandoned for running out of time
/// can still be rolled back.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Prepare `query` within this transaction.
    async fn prepare(&self, deadline: Deadline, query: &str)
    -> Result<Box<dyn Statement>, StoreError>;

    /// Commit the transaction.
    ///
    /// # Errors
    /// [`StoreError::Commit`], [`StoreError::DeadlineExceeded`], or
    /// [`StoreError::TransactionDone`] when the transaction already ended.
    async fn commit(&self) -> Result<(), StoreError>;

    /// Roll the transaction back.
    ///
    /// # Errors
    /// [`StoreError::Rollback`], or [`StoreError::TransactionDone`] when the
    /// transaction already ended.
    async fn rollback(&self) -> Result<(), StoreError>;
}

/// A store that can both prepare statements and begin transactions.
pub trait Store: Preparer + TxBeginner {}

impl<T> Store for T where T: Preparer + TxBeginner + ?Sized {}
