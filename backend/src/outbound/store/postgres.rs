//! PostgreSQL store adapter backed by an `sqlx` connection pool.
//!
//! `sqlx` caches prepared statements per connection, so a [`Statement`]
//! handed out here keeps only the query text and the executor it runs on.
//! Preparing validates the text against the server once; each execution
//! reuses the connection's cached plan.
//!
//! Statements prepared inside a transaction share the transaction's single
//! connection through an async mutex. Committing or rolling back takes the
//! connection out of the mutex, so later use reports
//! [`StoreError::TransactionDone`].
//!
//! A commit is bounded by the deadline the transaction was begun with. A
//! rollback gets its own [`ROLLBACK_TIMEOUT`], since it usually runs after
//! that deadline has already passed. If the rollback times out, dropping the
//! `sqlx` transaction rolls it back when the connection returns to the pool.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, PgPool, Postgres, Row as _, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::ports::{
    DbInfo, Deadline, IsolationLevel, Preparer, Row, Statement, StoreError, Transaction,
    TxBeginner, TxOptions, Value,
};

/// Upper bound on a rollback, independent of the caller's deadline.
pub const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(1);

type PgTransaction = sqlx::Transaction<'static, Postgres>;
type SharedTransaction = Arc<Mutex<Option<PgTransaction>>>;

/// Connection settings for [`PgStore::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl StoreSettings {
    /// Settings with the default pool size and acquire timeout.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Store over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    db_name: String,
    db_user: String,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .finish_non_exhaustive()
    }
}

/// Database name and user named by connection options.
fn identity(options: &PgConnectOptions) -> (String, String) {
    (
        options.get_database().unwrap_or_default().to_owned(),
        options.get_username().to_owned(),
    )
}

impl PgStore {
    /// Build the pool and check that the server answers.
    ///
    /// # Errors
    /// [`StoreError::Connection`] when the URL is malformed or the server
    /// cannot be reached within the acquire timeout.
    pub async fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        let options = PgConnectOptions::from_str(&settings.database_url)
            .map_err(|err| StoreError::connection(err.to_string()))?;
        let (db_name, db_user) = identity(&options);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(|err| connection_error(&err))?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|err| connection_error(&err))?;

        info!(db_name = %db_name, db_user = %db_user, "connected to postgres");
        Ok(Self {
            pool,
            db_name,
            db_user,
        })
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl DbInfo for PgStore {
    fn db_name(&self) -> &str {
        &self.db_name
    }

    fn db_user(&self) -> &str {
        &self.db_user
    }
}

#[async_trait]
impl Preparer for PgStore {
    async fn prepare(
        &self,
        deadline: Deadline,
        query: &str,
    ) -> Result<Box<dyn Statement>, StoreError> {
        deadline
            .run(self.pool.prepare(query))
            .await?
            .map_err(|err| prepare_error(&err))?;
        Ok(Box::new(PgStatement::new(query, Target::Pool(self.pool.clone()))))
    }
}

#[async_trait]
impl TxBeginner for PgStore {
    async fn begin_tx(
        &self,
        deadline: Deadline,
        options: TxOptions,
    ) -> Result<Box<dyn Transaction>, StoreError> {
        let mut tx = deadline
            .run(self.pool.begin())
            .await?
            .map_err(|err| connection_error(&err))?;
        if let Some(statement) = set_transaction_sql(options) {
            deadline
                .run(sqlx::query(&statement).execute(&mut *tx))
                .await?
                .map_err(|err| query_error(&err))?;
        }
        Ok(Box::new(PgTransactionHandle {
            tx: Arc::new(Mutex::new(Some(tx))),
            deadline,
        }))
    }
}

/// `SET TRANSACTION` statement applying `options`, if any apply.
fn set_transaction_sql(options: TxOptions) -> Option<String> {
    options.isolation.map(|level| {
        let level = match level {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        format!("SET TRANSACTION ISOLATION LEVEL {level}")
    })
}

struct PgTransactionHandle {
    tx: SharedTransaction,
    deadline: Deadline,
}

impl PgTransactionHandle {
    async fn take(&self) -> Result<PgTransaction, StoreError> {
        self.tx
            .lock()
            .await
            .take()
            .ok_or_else(StoreError::transaction_done)
    }
}

#[async_trait]
impl Transaction for PgTransactionHandle {
    async fn prepare(
        &self,
        deadline: Deadline,
        query: &str,
    ) -> Result<Box<dyn Statement>, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(StoreError::transaction_done)?;
        deadline
            .run((&mut **tx).prepare(query))
            .await?
            .map_err(|err| prepare_error(&err))?;
        Ok(Box::new(PgStatement::new(
            query,
            Target::Transaction(Arc::clone(&self.tx)),
        )))
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let tx = self.take().await?;
        self.deadline
            .run(tx.commit())
            .await?
            .map_err(|err| StoreError::commit(err.to_string()))
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let tx = self.take().await?;
        Deadline::after(ROLLBACK_TIMEOUT)
            .run(tx.rollback())
            .await?
            .map_err(|err| StoreError::rollback(err.to_string()))
    }
}

enum Target {
    Pool(PgPool),
    Transaction(SharedTransaction),
}

struct PgStatement {
    sql: String,
    target: Target,
    closed: std::sync::atomic::AtomicBool,
}

impl PgStatement {
    fn new(sql: &str, target: Target) -> Self {
        Self {
            sql: sql.to_owned(),
            target,
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn bound(&self, args: &[Value]) -> Result<Query<'_, Postgres, PgArguments>, StoreError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(StoreError::statement_closed());
        }
        Ok(bind_all(sqlx::query(&self.sql), args))
    }

    async fn fetch_all(&self, deadline: Deadline, args: &[Value]) -> Result<Vec<PgRow>, StoreError> {
        let query = self.bound(args)?;
        let rows = match &self.target {
            Target::Pool(pool) => deadline.run(query.fetch_all(pool)).await?,
            Target::Transaction(shared) => {
                let mut guard = shared.lock().await;
                let tx = guard.as_mut().ok_or_else(StoreError::transaction_done)?;
                deadline.run(query.fetch_all(&mut **tx)).await?
            }
        };
        rows.map_err(|err| query_error(&err))
    }

    async fn fetch_optional(
        &self,
        deadline: Deadline,
        args: &[Value],
    ) -> Result<Option<PgRow>, StoreError> {
        let query = self.bound(args)?;
        let row = match &self.target {
            Target::Pool(pool) => deadline.run(query.fetch_optional(pool)).await?,
            Target::Transaction(shared) => {
                let mut guard = shared.lock().await;
                let tx = guard.as_mut().ok_or_else(StoreError::transaction_done)?;
                deadline.run(query.fetch_optional(&mut **tx)).await?
            }
        };
        row.map_err(|err| query_error(&err))
    }
}

#[async_trait]
impl Statement for PgStatement {
    fn query(&self) -> &str {
        &self.sql
    }

    async fn exec(&self, deadline: Deadline, args: &[Value]) -> Result<u64, StoreError> {
        let query = self.bound(args)?;
        let done = match &self.target {
            Target::Pool(pool) => deadline.run(query.execute(pool)).await?,
            Target::Transaction(shared) => {
                let mut guard = shared.lock().await;
                let tx = guard.as_mut().ok_or_else(StoreError::transaction_done)?;
                deadline.run(query.execute(&mut **tx)).await?
            }
        };
        done.map(|result| result.rows_affected())
            .map_err(|err| query_error(&err))
    }

    async fn query_row(&self, deadline: Deadline, args: &[Value]) -> Result<Option<Row>, StoreError> {
        self.fetch_optional(deadline, args)
            .await?
            .as_ref()
            .map(decode_row)
            .transpose()
    }

    async fn query_rows(&self, deadline: Deadline, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.fetch_all(deadline, args)
            .await?
            .iter()
            .map(decode_row)
            .collect()
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return Err(StoreError::statement_closed());
        }
        Ok(())
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(value) => query.bind(*value),
            Value::Int(value) => query.bind(*value),
            Value::Text(value) => query.bind(value.clone()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, StoreError> {
    row.columns()
        .iter()
        .map(|column| decode_column(row, column.ordinal(), column.type_info().name()))
        .collect::<Result<Vec<_>, _>>()
        .map(Row::new)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, StoreError> {
    let decode = |err: sqlx::Error| StoreError::decode(err.to_string());
    if row.try_get_raw(index).map_err(decode)?.is_null() {
        return Ok(Value::Null);
    }
    match type_name {
        "INT8" => row.try_get::<i64, _>(index).map(Value::Int).map_err(decode),
        "INT4" => row
            .try_get::<i32, _>(index)
            .map(|value| Value::Int(i64::from(value)))
            .map_err(decode),
        "INT2" => row
            .try_get::<i16, _>(index)
            .map(|value| Value::Int(i64::from(value)))
            .map_err(decode),
        "BOOL" => row.try_get::<bool, _>(index).map(Value::Bool).map_err(decode),
        "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" => {
            row.try_get::<String, _>(index).map(Value::Text).map_err(decode)
        }
        other => Err(StoreError::decode(format!(
            "column {index} has unsupported type {other}"
        ))),
    }
}

fn connection_error(error: &sqlx::Error) -> StoreError {
    debug!(error = %error, "postgres connection failed");
    StoreError::connection(error.to_string())
}

fn is_connection_failure(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_)
    )
}

/// SQLSTATE class 42 covers syntax errors and undefined objects.
fn prepare_error(error: &sqlx::Error) -> StoreError {
    if is_connection_failure(error) {
        return connection_error(error);
    }
    match error {
        sqlx::Error::Database(db)
            if db.code().is_some_and(|code| code.starts_with("42")) =>
        {
            StoreError::syntax(db.message())
        }
        other => StoreError::query(other.to_string()),
    }
}

fn query_error(error: &sqlx::Error) -> StoreError {
    if is_connection_failure(error) {
        return connection_error(error);
    }
    match error {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. } => StoreError::decode(error.to_string()),
        other => StoreError::query(other.to_string()),
    }
}
