//! Test utilities for the accounts crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`).
//! Compiled for `cfg(test)` and behind the `test-support` feature.
//!
//! - [`RecordingStore`] is an in-memory [`crate::domain::ports::Store`] that records every call,
//!   replays scripted responses and tracks which writes were committed.
//! - [`EventCapture`] is a `tracing` layer that keeps emitted events so
//!   tests can assert on log output.
//! - [`RecordingQueryMetrics`] keeps every metrics observation in order.
//! - [`SequentialIds`] and [`FixedClock`] make identifiers and timestamps
//!   deterministic.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::domain::Id;
use crate::domain::ports::{
    DbInfo, Deadline, IdentifierGenerator, Preparer, QueryMetrics, Row, Statement, StoreError,
    Transaction, TxBeginner, TxOptions, Value,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `prepare`, either on the store or inside a transaction.
    Prepare {
        /// Statement text.
        query: String,
        /// Whether the statement was prepared within a transaction.
        in_tx: bool,
    },
    /// `begin_tx`.
    BeginTx,
    /// `Statement::exec`.
    Exec {
        /// Statement text.
        query: String,
        /// Bound arguments.
        args: Vec<Value>,
    },
    /// `Statement::query_row`.
    QueryRow {
        /// Statement text.
        query: String,
        /// Bound arguments.
        args: Vec<Value>,
    },
    /// `Statement::query_rows`.
    QueryRows {
        /// Statement text.
        query: String,
        /// Bound arguments.
        args: Vec<Value>,
    },
    /// `Statement::close`.
    Close {
        /// Statement text.
        query: String,
    },
    /// `Transaction::commit`.
    Commit,
    /// `Transaction::rollback`.
    Rollback,
}

/// Scripted outcome for statements whose text contains a fragment.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return these rows; `exec` reports their count as affected rows.
    Rows(Vec<Row>),
    /// Report this many affected rows and no result rows.
    Affected(u64),
    /// Fail with this error.
    Fail(StoreError),
}

/// Store-level operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `prepare` on the store or a transaction.
    Prepare,
    /// `begin_tx`.
    BeginTx,
    /// `Transaction::commit`.
    Commit,
    /// `Transaction::rollback`.
    Rollback,
    /// `Statement::close`.
    Close,
}

#[derive(Default)]
struct StoreState {
    calls: Vec<StoreCall>,
    responses: Vec<(String, Scripted)>,
    failures: HashMap<StoreOperation, StoreError>,
    committed: Vec<StoreCall>,
    latency: Option<Duration>,
    commit_latency: Option<Duration>,
    tx_options: Vec<TxOptions>,
}

impl StoreState {
    fn scripted(&self, query: &str) -> Option<Scripted> {
        self.responses
            .iter()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, response)| response.clone())
    }

    fn failure(&self, operation: StoreOperation) -> Result<(), StoreError> {
        self.failures
            .get(&operation)
            .map_or(Ok(()), |error| Err(error.clone()))
    }
}

/// In-memory store that records calls and replays scripted responses.
///
/// Writes executed inside a transaction become visible through
/// [`RecordingStore::committed`] only once the transaction commits; writes
/// executed outside a transaction are committed immediately.
///
/// # Examples
/// ```
/// use accounts::domain::ports::{Deadline, Preparer, Row, Value};
/// use accounts::test_support::{RecordingStore, Scripted, StoreCall};
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let store = RecordingStore::new();
/// store.respond("COUNT", Scripted::Rows(vec![Row::new(vec![Value::Int(2)])]));
///
/// let statement = store.prepare(Deadline::none(), "SELECT COUNT(*) FROM t").await.unwrap();
/// let row = statement.query_row(Deadline::none(), &[]).await.unwrap();
/// assert_eq!(row.unwrap().get_i64(0).unwrap(), 2);
/// assert!(matches!(store.calls()[0], StoreCall::Prepare { in_tx: false, .. }));
/// # });
/// ```
#[derive(Clone)]
pub struct RecordingStore {
    state: Arc<Mutex<StoreState>>,
    db_name: String,
    db_user: String,
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingStore")
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .finish_non_exhaustive()
    }
}

impl RecordingStore {
    /// Store reporting database `accounts` and user `accounts`.
    pub fn new() -> Self {
        Self::with_identity("accounts", "accounts")
    }

    /// Store reporting the given database name and user.
    pub fn with_identity(db_name: impl Into<String>, db_user: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            db_name: db_name.into(),
            db_user: db_user.into(),
        }
    }

    /// Answer statements whose text contains `fragment` with `response`.
    ///
    /// Earlier registrations win when several fragments match.
    pub fn respond(&self, fragment: &str, response: Scripted) {
        lock(&self.state)
            .responses
            .push((fragment.to_owned(), response));
    }

    /// Make every call of `operation` fail with `error`.
    pub fn fail(&self, operation: StoreOperation, error: StoreError) {
        lock(&self.state).failures.insert(operation, error);
    }

    /// Delay every statement execution by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.state).latency = Some(latency);
    }

    /// Delay every commit by `latency`, bounded by the transaction's deadline.
    pub fn set_commit_latency(&self, latency: Duration) {
        lock(&self.state).commit_latency = Some(latency);
    }

    /// Every call observed so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of observed calls equal to `call`.
    pub fn count(&self, call: &StoreCall) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|observed| *observed == call)
            .count()
    }

    /// Options of every transaction begun, in order.
    pub fn tx_options(&self) -> Vec<TxOptions> {
        lock(&self.state).tx_options.clone()
    }

    /// Writes that were committed, in commit order.
    pub fn committed(&self) -> Vec<StoreCall> {
        lock(&self.state).committed.clone()
    }

    fn record(&self, call: StoreCall) {
        lock(&self.state).calls.push(call);
    }

    fn check(&self, operation: StoreOperation) -> Result<(), StoreError> {
        lock(&self.state).failure(operation)
    }

    fn statement(&self, query: &str, pending: Option<Arc<Mutex<Vec<StoreCall>>>>) -> Box<dyn Statement> {
        Box::new(RecordingStatement {
            store: self.clone(),
            query: query.to_owned(),
            pending,
            closed: AtomicBool::new(false),
        })
    }
}

impl DbInfo for RecordingStore {
    fn db_name(&self) -> &str {
        &self.db_name
    }

    fn db_user(&self) -> &str {
        &self.db_user
    }
}

#[async_trait]
impl Preparer for RecordingStore {
    async fn prepare(
        &self,
        deadline: Deadline,
        query: &str,
    ) -> Result<Box<dyn Statement>, StoreError> {
        self.record(StoreCall::Prepare {
            query: query.to_owned(),
            in_tx: false,
        });
        expire(deadline)?;
        self.check(StoreOperation::Prepare)?;
        Ok(self.statement(query, None))
    }
}

#[async_trait]
impl TxBeginner for RecordingStore {
    async fn begin_tx(
        &self,
        deadline: Deadline,
        options: TxOptions,
    ) -> Result<Box<dyn Transaction>, StoreError> {
        self.record(StoreCall::BeginTx);
        lock(&self.state).tx_options.push(options);
        expire(deadline)?;
        self.check(StoreOperation::BeginTx)?;
        Ok(Box::new(RecordingTransaction {
            store: self.clone(),
            pending: Arc::new(Mutex::new(Vec::new())),
            done: AtomicBool::new(false),
            deadline,
        }))
    }
}

fn expire(deadline: Deadline) -> Result<(), StoreError> {
    if deadline.is_expired() {
        return Err(StoreError::deadline_exceeded());
    }
    Ok(())
}

struct RecordingTransaction {
    store: RecordingStore,
    pending: Arc<Mutex<Vec<StoreCall>>>,
    done: AtomicBool,
    deadline: Deadline,
}

impl RecordingTransaction {
    fn finish(&self) -> Result<(), StoreError> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Err(StoreError::transaction_done());
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for RecordingTransaction {
    async fn prepare(
        &self,
        deadline: Deadline,
        query: &str,
    ) -> Result<Box<dyn Statement>, StoreError> {
        self.store.record(StoreCall::Prepare {
            query: query.to_owned(),
            in_tx: true,
        });
        if self.done.load(Ordering::Acquire) {
            return Err(StoreError::transaction_done());
        }
        expire(deadline)?;
        self.store.check(StoreOperation::Prepare)?;
        Ok(self.store.statement(query, Some(Arc::clone(&self.pending))))
    }

    async fn commit(&self) -> Result<(), StoreError> {
        self.store.record(StoreCall::Commit);
        self.finish()?;
        let latency = lock(&self.store.state).commit_latency;
        if let Some(delay) = latency {
            self.deadline.run(tokio::time::sleep(delay)).await?;
        }
        expire(self.deadline)?;
        self.store.check(StoreOperation::Commit)?;
        let writes = std::mem::take(&mut *lock(&self.pending));
        lock(&self.store.state).committed.extend(writes);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        self.store.record(StoreCall::Rollback);
        self.finish()?;
        lock(&self.pending).clear();
        self.store.check(StoreOperation::Rollback)
    }
}

struct RecordingStatement {
    store: RecordingStore,
    query: String,
    pending: Option<Arc<Mutex<Vec<StoreCall>>>>,
    closed: AtomicBool,
}

impl RecordingStatement {
    async fn run(&self, deadline: Deadline, call: StoreCall) -> Result<Option<Scripted>, StoreError> {
        self.store.record(call);
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::statement_closed());
        }
        let latency = lock(&self.store.state).latency;
        if let Some(delay) = latency {
            deadline.run(tokio::time::sleep(delay)).await?;
        }
        expire(deadline)?;
        let scripted = lock(&self.store.state).scripted(&self.query);
        match scripted {
            Some(Scripted::Fail(error)) => Err(error),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl Statement for RecordingStatement {
    fn query(&self) -> &str {
        &self.query
    }

    async fn exec(&self, deadline: Deadline, args: &[Value]) -> Result<u64, StoreError> {
        let call = StoreCall::Exec {
            query: self.query.clone(),
            args: args.to_vec(),
        };
        let scripted = self.run(deadline, call.clone()).await?;
        match &self.pending {
            Some(pending) => lock(pending).push(call),
            None => lock(&self.store.state).committed.push(call),
        }
        Ok(match scripted {
            Some(Scripted::Affected(count)) => count,
            Some(Scripted::Rows(rows)) => u64::try_from(rows.len()).unwrap_or(u64::MAX),
            _ => 1,
        })
    }

    async fn query_row(&self, deadline: Deadline, args: &[Value]) -> Result<Option<Row>, StoreError> {
        let call = StoreCall::QueryRow {
            query: self.query.clone(),
            args: args.to_vec(),
        };
        Ok(match self.run(deadline, call).await? {
            Some(Scripted::Rows(rows)) => rows.into_iter().next(),
            _ => None,
        })
    }

    async fn query_rows(&self, deadline: Deadline, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        let call = StoreCall::QueryRows {
            query: self.query.clone(),
            args: args.to_vec(),
        };
        Ok(match self.run(deadline, call).await? {
            Some(Scripted::Rows(rows)) => rows,
            _ => Vec::new(),
        })
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.store.record(StoreCall::Close {
            query: self.query.clone(),
        });
        self.closed.store(true, Ordering::Release);
        self.store.check(StoreOperation::Close)
    }
}

/// One observation made through [`QueryMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricEvent {
    /// `observe_duration` with the operation label and elapsed time.
    Duration(String, Duration),
    /// `record_error` with the operation label.
    Error(String),
    /// `record_rollback`.
    Rollback,
}

/// Metrics recorder keeping every observation in call order.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueryMetrics {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl RecordingQueryMetrics {
    /// Observations so far, in order.
    pub fn events(&self) -> Vec<MetricEvent> {
        lock(&self.events).clone()
    }

    /// Operation labels of the duration observations, in order.
    pub fn observed_operations(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                MetricEvent::Duration(operation, _) => Some(operation.clone()),
                _ => None,
            })
            .collect()
    }
}

impl QueryMetrics for RecordingQueryMetrics {
    fn observe_duration(&self, operation: &str, elapsed: Duration) {
        lock(&self.events).push(MetricEvent::Duration(operation.to_owned(), elapsed));
    }

    fn record_error(&self, operation: &str) {
        lock(&self.events).push(MetricEvent::Error(operation.to_owned()));
    }

    fn record_rollback(&self) {
        lock(&self.events).push(MetricEvent::Rollback);
    }
}

/// Identifier generator yielding `prefix-1`, `prefix-2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Start counting at 1 with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdentifierGenerator for SequentialIds {
    fn generate(&self) -> Id {
        let value = self.next.fetch_add(1, Ordering::Relaxed);
        Id::new(format!("{}-{value}", self.prefix))
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// One captured `tracing` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Event message.
    pub message: String,
    /// Remaining fields rendered as strings.
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Field value, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// `tracing` layer storing every event it sees.
///
/// # Examples
/// ```
/// use accounts::test_support::EventCapture;
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let capture = EventCapture::default();
/// let subscriber = tracing_subscriber::registry().with(capture.clone());
/// tracing::subscriber::with_default(subscriber, || tracing::info!(answer = 42, "hello"));
///
/// let events = capture.events();
/// assert_eq!(events[0].message, "hello");
/// assert_eq!(events[0].field("answer"), Some("42"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    /// Snapshot of captured events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        lock(&self.events).clone()
    }

    /// Captured events with the given message.
    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        lock(&self.events)
            .iter()
            .filter(|event| event.message == message)
            .cloned()
            .collect()
    }
}

impl<S> Layer<S> for EventCapture
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);
        let message = visitor.fields.remove("message").unwrap_or_default();
        lock(&self.events).push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldCollector {
    fields: BTreeMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_owned(), format!("{value:?}"));
    }
}
