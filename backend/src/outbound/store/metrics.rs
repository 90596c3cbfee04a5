//! Store decorator recording call latency, failures and rollbacks.
//!
//! Every call observes its duration first and, when it failed, counts the
//! failure second; the wrapped result is then returned unchanged. Statements
//! are labelled with their leading verb (`SELECT`, `INSERT`, ...), every
//! other call with a fixed label such as `PREPARE` or `COMMIT`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::ports::{
    DbInfo, Deadline, OPERATION_BEGIN, OPERATION_CLOSE, OPERATION_COMMIT, OPERATION_PREPARE,
    OPERATION_ROLLBACK, Preparer, QueryMetrics, Row, Statement, StoreError, Transaction,
    TxBeginner, TxOptions, Value, statement_operation,
};
use crate::domain::timing::round_to_millis;

async fn measured<T, F>(metrics: &dyn QueryMetrics, operation: &str, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    let outcome = call.await;
    metrics.observe_duration(operation, round_to_millis(started.elapsed()));
    if outcome.is_err() {
        metrics.record_error(operation);
    }
    outcome
}

/// Metrics decorator over any store.
///
/// # Examples
/// ```
/// use std::sync::Arc;
///
/// use accounts::domain::ports::NoOpQueryMetrics;
/// use accounts::outbound::store::MetricsStore;
/// use accounts::test_support::RecordingStore;
///
/// let store = MetricsStore::new(RecordingStore::new(), Arc::new(NoOpQueryMetrics));
/// # let _ = store;
/// ```
pub struct MetricsStore<S> {
    inner: S,
    metrics: Arc<dyn QueryMetrics>,
}

impl<S> MetricsStore<S> {
    /// Wrap `inner`, reporting to `metrics`.
    pub fn new(inner: S, metrics: Arc<dyn QueryMetrics>) -> Self {
        Self { inner, metrics }
    }
}

impl<S: DbInfo> DbInfo for MetricsStore<S> {
    fn db_name(&self) -> &str {
        self.inner.db_name()
    }

    fn db_user(&self) -> &str {
        self.inner.db_user()
    }
}

#[async_trait]
impl<S: Preparer> Preparer for MetricsStore<S> {
    async fn prepare(
        &self,
        deadline: Deadline,
        query: &str,
    ) -> Result<Box<dyn Statement>, StoreError> {
        let statement = measured(
            self.metrics.as_ref(),
            OPERATION_PREPARE,
            self.inner.prepare(deadline, query),
        )
        .await?;
        Ok(Box::new(MetricsStatement::new(statement, Arc::clone(&self.metrics))))
    }
}

#[async_trait]
impl<S: TxBeginner> TxBeginner for MetricsStore<S> {
    async fn begin_tx(
        &self,
        deadline: Deadline,
        options: TxOptions,
    ) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = measured(
            self.metrics.as_ref(),
            OPERATION_BEGIN,
            self.inner.begin_tx(deadline, options),
        )
        .await?;
        Ok(Box::new(MetricsTransaction {
            inner: tx,
            metrics: Arc::clone(&self.metrics),
        }))
    }
}

struct MetricsTransaction {
    inner: Box<dyn Transaction>,
    metrics: Arc<dyn QueryMetrics>,
}

#[async_trait]
impl Transaction for MetricsTransaction {
    async fn prepare(
        &self,
        deadline: Deadline,
        query: &str,
    ) -> Result<Box<dyn Statement>, StoreError> {
        let statement = measured(
            self.metrics.as_ref(),
            OPERATION_PREPARE,
            self.inner.prepare(deadline, query),
        )
        .await?;
        Ok(Box::new(MetricsStatement::new(statement, Arc::clone(&self.metrics))))
    }

    async fn commit(&self) -> Result<(), StoreError> {
        measured(self.metrics.as_ref(), OPERATION_COMMIT, self.inner.commit()).await
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        self.metrics.record_rollback();
        measured(self.metrics.as_ref(), OPERATION_ROLLBACK, self.inner.rollback()).await
    }
}

struct MetricsStatement {
    inner: Box<dyn Statement>,
    metrics: Arc<dyn QueryMetrics>,
    operation: String,
}

impl MetricsStatement {
    fn new(inner: Box<dyn Statement>, metrics: Arc<dyn QueryMetrics>) -> Self {
        let operation = statement_operation(inner.query());
        Self {
            inner,
            metrics,
            operation,
        }
    }
}

#[async_trait]
impl Statement for MetricsStatement {
    fn query(&self) -> &str {
        self.inner.query()
    }

    async fn exec(&self, deadline: Deadline, args: &[Value]) -> Result<u64, StoreError> {
        measured(
            self.metrics.as_ref(),
            &self.operation,
            self.inner.exec(deadline, args),
        )
        .await
    }

    async fn query_row(&self, deadline: Deadline, args: &[Value]) -> Result<Option<Row>, StoreError> {
        measured(
            self.metrics.as_ref(),
            &self.operation,
            self.inner.query_row(deadline, args),
        )
        .await
    }

    async fn query_rows(&self, deadline: Deadline, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        measured(
            self.metrics.as_ref(),
            &self.operation,
            self.inner.query_rows(deadline, args),
        )
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        measured(self.metrics.as_ref(), OPERATION_CLOSE, self.inner.close()).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockall::Sequence;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ports::MockQueryMetrics;
    use crate::test_support::{
        MetricEvent, RecordingQueryMetrics, RecordingStore, Scripted, StoreCall, StoreOperation,
    };

    #[fixture]
    fn store() -> RecordingStore {
        RecordingStore::new()
    }

    fn decorated(store: &RecordingStore) -> (MetricsStore<RecordingStore>, RecordingQueryMetrics) {
        let metrics = RecordingQueryMetrics::default();
        (
            MetricsStore::new(store.clone(), Arc::new(metrics.clone())),
            metrics,
        )
    }

    #[rstest]
    #[tokio::test]
    async fn failures_observe_duration_then_count_the_error(store: RecordingStore) {
        store.fail(StoreOperation::Prepare, StoreError::syntax("near \"SELEC\""));
        let mut metrics = MockQueryMetrics::new();
        let mut seq = Sequence::new();
        metrics
            .expect_observe_duration()
            .withf(|operation, _| operation == OPERATION_PREPARE)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        metrics
            .expect_record_error()
            .withf(|operation| operation == OPERATION_PREPARE)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let decorated = MetricsStore::new(store.clone(), Arc::new(metrics));

        let error = decorated
            .prepare(Deadline::none(), "SELEC 1")
            .await
            .err()
            .expect("prepare fails");

        assert_eq!(error, StoreError::syntax("near \"SELEC\""));
    }

    #[rstest]
    #[tokio::test]
    async fn successes_only_observe_duration(store: RecordingStore) {
        let mut metrics = MockQueryMetrics::new();
        metrics.expect_observe_duration().times(2).return_const(());
        metrics.expect_record_error().never();
        let decorated = MetricsStore::new(store.clone(), Arc::new(metrics));

        let statement = decorated
            .prepare(Deadline::none(), "SELECT 1")
            .await
            .expect("prepare");
        statement
            .query_rows(Deadline::none(), &[])
            .await
            .expect("query");
    }

    #[rstest]
    #[tokio::test]
    async fn statements_are_labelled_with_their_verb(store: RecordingStore) {
        let (decorated, metrics) = decorated(&store);

        let tx = decorated
            .begin_tx(Deadline::none(), TxOptions::default())
            .await
            .expect("begin");
        let statement = tx
            .prepare(Deadline::none(), "insert into users values ($1)")
            .await
            .expect("prepare");
        statement
            .exec(Deadline::none(), &[Value::from("u1")])
            .await
            .expect("exec");
        statement.close().await.expect("close");
        tx.commit().await.expect("commit");

        assert_eq!(
            metrics.observed_operations(),
            vec!["BEGIN", "PREPARE", "INSERT", "CLOSE", "COMMIT"]
        );
        assert_eq!(store.count(&StoreCall::Commit), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn rollback_is_counted_even_when_it_fails(store: RecordingStore) {
        store.fail(StoreOperation::Rollback, StoreError::rollback("broken pipe"));
        let (decorated, metrics) = decorated(&store);
        let tx = decorated
            .begin_tx(Deadline::none(), TxOptions::default())
            .await
            .expect("begin");

        tx.rollback().await.expect_err("rollback fails");

        let events = metrics.events();
        assert_eq!(events[1], MetricEvent::Rollback);
        assert!(matches!(&events[2], MetricEvent::Duration(op, _) if op == OPERATION_ROLLBACK));
        assert_eq!(events[3], MetricEvent::Error(OPERATION_ROLLBACK.to_owned()));
    }

    #[rstest]
    #[tokio::test]
    async fn statement_errors_are_returned_unchanged(store: RecordingStore) {
        store.respond(
            "SELECT",
            Scripted::Fail(StoreError::query("relation \"users\" does not exist")),
        );
        let (decorated, metrics) = decorated(&store);
        let statement = decorated
            .prepare(Deadline::none(), "SELECT * FROM users")
            .await
            .expect("prepare");

        let error = statement
            .query_row(Deadline::none(), &[])
            .await
            .expect_err("query fails");

        assert_eq!(error, StoreError::query("relation \"users\" does not exist"));
        assert_eq!(
            metrics.events().last(),
            Some(&MetricEvent::Error("SELECT".to_owned()))
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn durations_come_from_the_monotonic_clock(store: RecordingStore) {
        store.set_latency(Duration::from_millis(12));
        let (decorated, metrics) = decorated(&store);
        let statement = decorated
            .prepare(Deadline::none(), "SELECT 1")
            .await
            .expect("prepare");

        statement
            .query_row(Deadline::none(), &[])
            .await
            .expect("query");

        assert_eq!(
            metrics.events().last(),
            Some(&MetricEvent::Duration(
                "SELECT".to_owned(),
                Duration::from_millis(12)
            ))
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn expired_deadlines_count_as_errors(store: RecordingStore) {
        store.set_latency(Duration::from_secs(2));
        let (decorated, metrics) = decorated(&store);
        let statement = decorated
            .prepare(Deadline::none(), "SELECT 1")
            .await
            .expect("prepare");

        let error = statement
            .query_row(Deadline::after(Duration::from_secs(1)), &[])
            .await
            .expect_err("deadline");

        assert_eq!(error, StoreError::DeadlineExceeded);
        assert_eq!(
            metrics.events().last(),
            Some(&MetricEvent::Error("SELECT".to_owned()))
        );
    }

    #[rstest]
    fn identity_is_forwarded(store: RecordingStore) {
        let (decorated, _) = decorated(&store);
        assert_eq!(decorated.db_name(), "accounts");
        assert_eq!(decorated.db_user(), "accounts");
    }
}
