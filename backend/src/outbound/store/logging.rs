//! Store decorator emitting one structured event per call.
//!
//! Every call logs at `debug` with its timings, arguments and outcome; a
//! failed call logs the same fields again at `error`. Constant fields come
//! from an immutable [`LogContext`] that each child object derives its own
//! copy from.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use tracing::{debug, error};

use crate::domain::ports::{
    DbInfo, Deadline, Preparer, Row, Statement, StoreError, Transaction, TxBeginner, TxOptions,
    Value,
};
use crate::domain::timing::{Timing, track};

/// Constant fields attached to every store event.
///
/// # Examples
/// ```
/// use accounts::outbound::store::LogContext;
///
/// let root = LogContext::new("accounts", "svc");
/// let tx = root.named("tx");
/// assert_eq!(root.scope(), "store");
/// assert_eq!(tx.scope(), "store.tx");
/// assert_eq!(tx.named("stmt").scope(), "store.tx.stmt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    scope: String,
    db_name: String,
    db_user: String,
}

impl LogContext {
    /// Root context for a store connected as `db_user` to `db_name`.
    pub fn new(db_name: impl Into<String>, db_user: impl Into<String>) -> Self {
        Self {
            scope: "store".to_owned(),
            db_name: db_name.into(),
            db_user: db_user.into(),
        }
    }

    /// Copy of this context for a child scope.
    #[must_use]
    pub fn named(&self, child: &str) -> Self {
        Self {
            scope: format!("{}.{child}", self.scope),
            ..self.clone()
        }
    }

    /// Dotted scope name.
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

enum Args<'a> {
    None,
    Values(&'a [Value]),
    Options(TxOptions),
}

impl Debug for Args<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("[]"),
            Self::Values(values) => values.fmt(f),
            Self::Options(options) => options.fmt(f),
        }
    }
}

struct Call<'a> {
    name: &'static str,
    query: &'a str,
    args: Args<'a>,
}

fn emit(ctx: &LogContext, call: &Call<'_>, timing: &Timing, failure: Option<&StoreError>) {
    debug!(
        scope = %ctx.scope,
        db_name = %ctx.db_name,
        db_user = %ctx.db_user,
        call = call.name,
        query = call.query,
        args = ?call.args,
        start = %timing.start,
        end = %timing.end,
        elapsed_ms = timing.elapsed_ms(),
        error = ?failure,
        "store call"
    );
    if let Some(err) = failure {
        error!(
            scope = %ctx.scope,
            db_name = %ctx.db_name,
            db_user = %ctx.db_user,
            call = call.name,
            query = call.query,
            args = ?call.args,
            start = %timing.start,
            end = %timing.end,
            elapsed_ms = timing.elapsed_ms(),
            error = ?err,
            "store call failed"
        );
    }
}

async fn logged<T, F>(
    ctx: &LogContext,
    clock: &dyn Clock,
    call: Call<'_>,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let (outcome, timing) = track(clock, fut).await;
    emit(ctx, &call, &timing, outcome.as_ref().err());
    outcome
}

/// Logging decorator over any store.
pub struct LoggingStore<S> {
    inner: S,
    ctx: LogContext,
    clock: Arc<dyn Clock>,
}

impl<S: DbInfo> LoggingStore<S> {
    /// Wrap `inner`, naming the database and user it reports.
    pub fn new(inner: S, clock: Arc<dyn Clock>) -> Self {
        let ctx = LogContext::new(inner.db_name(), inner.db_user());
        Self { inner, ctx, clock }
    }
}

impl<S> LoggingStore<S> {
    fn statement(&self, inner: Box<dyn Statement>, ctx: LogContext) -> Box<dyn Statement> {
        Box::new(LoggingStatement {
            inner,
            ctx,
            clock: Arc::clone(&self.clock),
        })
    }
}

impl<S: DbInfo> DbInfo for LoggingStore<S> {
    fn db_name(&self) -> &str {
        self.inner.db_name()
    }

    fn db_user(&self) -> &str {
        self.inner.db_user()
    }
}

#[async_trait]
impl<S: Preparer> Preparer for LoggingStore<S> {
    async fn prepare(
        &self,
        deadline: Deadline,
        query: &str,
    ) -> Result<Box<dyn Statement>, StoreError> {
        let call = Call {
            name: "prepare",
            query,
            args: Args::None,
        };
        let statement = logged(
            &self.ctx,
            self.clock.as_ref(),
            call,
            self.inner.prepare(deadline, query),
        )
        .await?;
        Ok(self.statement(statement, self.ctx.named("stmt")))
    }
}

#[async_trait]
impl<S: TxBeginner> TxBeginner for LoggingStore<S> {
    async fn begin_tx(
        &self,
        deadline: Deadline,
        options: TxOptions,
    ) -> Result<Box<dyn Transaction>, StoreError> {
        let call = Call {
            name: "begin_tx",
            query: "",
            args: Args::Options(options),
        };
        let tx = logged(
            &self.ctx,
            self.clock.as_ref(),
            call,
            self.inner.begin_tx(deadline, options),
        )
        .await?;
        Ok(Box::new(LoggingTransaction {
            inner: tx,
            ctx: self.ctx.named("tx"),
            clock: Arc::clone(&self.clock),
        }))
    }
}

struct LoggingTransaction {
    inner: Box<dyn Transaction>,
    ctx: LogContext,
    clock: Arc<dyn Clock>,
}

impl LoggingTransaction {
    async fn finish<F>(&self, name: &'static str, fut: F) -> Result<(), StoreError>
    where
        F: Future<Output = Result<(), StoreError>>,
    {
        let call = Call {
            name,
            query: "",
            args: Args::None,
        };
        logged(&self.ctx, self.clock.as_ref(), call, fut).await
    }
}

#[async_trait]
impl Transaction for LoggingTransaction {
    async fn prepare(
        &self,
        deadline: Deadline,
        query: &str,
    ) -> Result<Box<dyn Statement>, StoreError> {
        let call = Call {
            name: "prepare",
            query,
            args: Args::None,
        };
        let statement = logged(
            &self.ctx,
            self.clock.as_ref(),
            call,
            self.inner.prepare(deadline, query),
        )
        .await?;
        Ok(Box::new(LoggingStatement {
            inner: statement,
            ctx: self.ctx.named("stmt"),
            clock: Arc::clone(&self.clock),
        }))
    }

    async fn commit(&self) -> Result<(), StoreError> {
        self.finish("commit", self.inner.commit()).await
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        self.finish("rollback", self.inner.rollback()).await
    }
}

struct LoggingStatement {
    inner: Box<dyn Statement>,
    ctx: LogContext,
    clock: Arc<dyn Clock>,
}

impl LoggingStatement {
    fn call<'a>(&'a self, name: &'static str, args: &'a [Value]) -> Call<'a> {
        Call {
            name,
            query: self.inner.query(),
            args: Args::Values(args),
        }
    }
}

#[async_trait]
impl Statement for LoggingStatement {
    fn query(&self) -> &str {
        self.inner.query()
    }

    async fn exec(&self, deadline: Deadline, args: &[Value]) -> Result<u64, StoreError> {
        logged(
            &self.ctx,
            self.clock.as_ref(),
            self.call("exec", args),
            self.inner.exec(deadline, args),
        )
        .await
    }

    async fn query_row(&self, deadline: Deadline, args: &[Value]) -> Result<Option<Row>, StoreError> {
        logged(
            &self.ctx,
            self.clock.as_ref(),
            self.call("query_row", args),
            self.inner.query_row(deadline, args),
        )
        .await
    }

    async fn query_rows(&self, deadline: Deadline, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        logged(
            &self.ctx,
            self.clock.as_ref(),
            self.call("query_rows", args),
            self.inner.query_rows(deadline, args),
        )
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        logged(
            &self.ctx,
            self.clock.as_ref(),
            self.call("close", &[]),
            self.inner.close(),
        )
        .await
    }
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
