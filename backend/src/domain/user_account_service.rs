//! SQL-backed user account service.
//!
//! Creation runs as a small state machine inside one transaction:
//!
//! ```text
//! Started -> TxBegun -> UserInserted -> AccountInserted -> Committed
//!                  \____________\_______________\______-> RolledBack
//! ```
//!
//! Any failure before commit rolls back exactly once. A commit failure is
//! terminal and is reported without a rollback attempt. Reads run without a
//! transaction; the three listing queries are only consistent per statement.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use pagination::FindOptions;
use serde_json::json;
use tracing::{debug, error};

use super::ports::{
    Deadline, IdentifierGenerator, IsolationLevel, Row, Statement, Store, StoreError,
    Transaction, TxOptions, UserAccountService, Value,
};
use super::user_account_queries as sql;
use super::{Error, FindUserAccountsResult, Id, User, UserAccount};

/// Upper bound on the store work behind one service call.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Transaction options for account creation.
///
/// Pinned to read committed so a stricter server default cannot introduce
/// serialization failures, which this service does not retry.
pub const CREATE_TX_OPTIONS: TxOptions = TxOptions::with_isolation(IsolationLevel::ReadCommitted);

/// Progress of a create operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    /// Nothing has touched the store yet.
    Started,
    /// The transaction is open.
    TxBegun,
    /// The `users` row was written.
    UserInserted,
    /// The `user_accounts` row was written.
    AccountInserted,
    /// The transaction committed.
    Committed,
    /// The transaction was rolled back.
    RolledBack,
}

fn store_failure(action: &str, error: &StoreError) -> Error {
    Error::internal(format!("failed to {action}: {error}"))
}

/// User account service backed by a transactional store.
///
/// # Examples
/// ```
/// use std::sync::Arc;
///
/// use accounts::domain::SqlUserAccountService;
/// use accounts::outbound::identifier::RandomIdentifierGenerator;
/// use accounts::test_support::RecordingStore;
/// use mockable::DefaultClock;
///
/// let service = SqlUserAccountService::new(
///     Arc::new(RecordingStore::new()),
///     Arc::new(RandomIdentifierGenerator),
///     Arc::new(DefaultClock),
/// );
/// # let _ = service;
/// ```
#[derive(Clone)]
pub struct SqlUserAccountService<S: ?Sized> {
    store: Arc<S>,
    ids: Arc<dyn IdentifierGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S: ?Sized> SqlUserAccountService<S> {
    /// Create a service over `store`.
    pub fn new(store: Arc<S>, ids: Arc<dyn IdentifierGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { store, ids, clock }
    }
}

impl<S> SqlUserAccountService<S>
where
    S: Store + ?Sized,
{
    async fn insert_account(
        &self,
        tx: &dyn Transaction,
        deadline: Deadline,
        account: &mut UserAccount,
        stage: &mut CreateStage,
    ) -> Result<(), Error> {
        let existing = tx_query_row(tx, deadline, sql::USERNAME_EXISTS, &[
            Value::from(account.username()),
        ])
        .await
        .map_err(|err| store_failure("check username", &err))?;
        let taken = existing
            .map(|row| row.get_bool(0))
            .transpose()
            .map_err(|err| store_failure("check username", &err))?
            .unwrap_or(false);
        if taken {
            return Err(Error::conflict(format!(
                "user account with username \"{}\" already exists",
                account.username()
            ))
            .with_details(json!({ "username": account.username() })));
        }

        account
            .user_mut()
            .assign(self.ids.generate(), self.clock.utc());
        let user = account.user();
        tx_exec(tx, deadline, sql::INSERT_USER, &[
            Value::from(user.id().as_str()),
            Value::from(user.first_name()),
            Value::from(user.last_name()),
            Value::Int(user.created_at().timestamp_millis()),
        ])
        .await
        .map_err(|err| store_failure("insert user", &err))?;
        *stage = CreateStage::UserInserted;

        account.assign(self.ids.generate(), self.clock.utc());
        tx_exec(tx, deadline, sql::INSERT_USER_ACCOUNT, &[
            Value::from(account.id().as_str()),
            Value::from(account.username()),
            Value::from(account.user().id().as_str()),
            Value::Int(account.created_at().timestamp_millis()),
        ])
        .await
        .map_err(|err| store_failure("insert user account", &err))?;
        *stage = CreateStage::AccountInserted;

        Ok(())
    }
}

/// Roll back after `cause`, returning the error to surface.
///
/// A failed rollback supersedes `cause`; the original code and message are
/// kept under `details.cause`.
async fn abort(tx: &dyn Transaction, stage: CreateStage, cause: Error) -> Error {
    match tx.rollback().await {
        Ok(()) => {
            debug!(
                failed_stage = ?stage,
                stage = ?CreateStage::RolledBack,
                error = %cause,
                "user account creation rolled back"
            );
            cause
        }
        Err(rollback_error) => {
            error!(
                failed_stage = ?stage,
                cause = %cause,
                error = %rollback_error,
                "rollback after failed user account creation failed"
            );
            store_failure("roll back user account creation", &rollback_error).with_details(json!({
                "cause": { "code": cause.code(), "message": cause.message() }
            }))
        }
    }
}

/// Close `statement`, keeping its work's outcome first.
///
/// A close failure is reported only when the work itself succeeded.
async fn finish<T>(
    statement: &dyn Statement,
    outcome: Result<T, StoreError>,
) -> Result<T, StoreError> {
    let closed = statement.close().await;
    let value = outcome?;
    closed?;
    Ok(value)
}

async fn tx_exec(
    tx: &dyn Transaction,
    deadline: Deadline,
    query: &str,
    args: &[Value],
) -> Result<u64, StoreError> {
    let statement = tx.prepare(deadline, query).await?;
    let outcome = statement.exec(deadline, args).await;
    finish(statement.as_ref(), outcome).await
}

async fn tx_query_row(
    tx: &dyn Transaction,
    deadline: Deadline,
    query: &str,
    args: &[Value],
) -> Result<Option<Row>, StoreError> {
    let statement = tx.prepare(deadline, query).await?;
    let outcome = statement.query_row(deadline, args).await;
    finish(statement.as_ref(), outcome).await
}

async fn query_row<S>(
    store: &S,
    deadline: Deadline,
    query: &str,
    args: &[Value],
) -> Result<Option<Row>, StoreError>
where
    S: Store + ?Sized,
{
    let statement = store.prepare(deadline, query).await?;
    let outcome = statement.query_row(deadline, args).await;
    finish(statement.as_ref(), outcome).await
}

async fn query_rows<S>(
    store: &S,
    deadline: Deadline,
    query: &str,
    args: &[Value],
) -> Result<Vec<Row>, StoreError>
where
    S: Store + ?Sized,
{
    let statement = store.prepare(deadline, query).await?;
    let outcome = statement.query_rows(deadline, args).await;
    finish(statement.as_ref(), outcome).await
}

fn timestamp(row: &Row, index: usize) -> Result<DateTime<Utc>, StoreError> {
    let millis = row.get_i64(index)?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::decode(format!("column {index} holds invalid timestamp {millis}")))
}

/// Decode `(account id, username, account created, user id, first name,
/// last name, user created)`.
fn account_from_row(row: &Row) -> Result<UserAccount, StoreError> {
    let user = User::from_parts(
        Id::new(row.get_str(3)?),
        row.get_str(4)?,
        row.get_str(5)?,
        timestamp(row, 6)?,
    );
    Ok(UserAccount::from_parts(
        Id::new(row.get_str(0)?),
        row.get_str(1)?,
        user,
        timestamp(row, 2)?,
    ))
}

fn bind_position(value: u64) -> Result<Value, Error> {
    i64::try_from(value)
        .map(Value::Int)
        .map_err(|_| Error::invalid_request(format!("pagination value {value} is out of range")))
}

#[async_trait]
impl<S> UserAccountService for SqlUserAccountService<S>
where
    S: Store + ?Sized + 'static,
{
    async fn create_user_account(&self, mut account: UserAccount) -> Result<UserAccount, Error> {
        let deadline = Deadline::after(OPERATION_TIMEOUT);

        let tx = self
            .store
            .begin_tx(deadline, CREATE_TX_OPTIONS)
            .await
            .map_err(|err| {
                debug!(
                    stage = ?CreateStage::Started,
                    error = %err,
                    "could not begin user account creation"
                );
                store_failure("begin transaction", &err)
            })?;
        let mut stage = CreateStage::TxBegun;

        if let Err(cause) = self
            .insert_account(tx.as_ref(), deadline, &mut account, &mut stage)
            .await
        {
            return Err(abort(tx.as_ref(), stage, cause).await);
        }

        tx.commit()
            .await
            .map_err(|err| store_failure("commit user account", &err))?;
        debug!(
            stage = ?CreateStage::Committed,
            user_account_id = %account.id(),
            "user account created"
        );

        Ok(account)
    }

    async fn find_user_accounts(
        &self,
        options: FindOptions,
    ) -> Result<FindUserAccountsResult, Error> {
        let deadline = Deadline::after(OPERATION_TIMEOUT);
        let window = [bind_position(options.offset())?, bind_position(options.limit())?];
        let next_position = bind_position(options.next_offset())?;

        let total = query_row(self.store.as_ref(), deadline, sql::COUNT_USER_ACCOUNTS, &[])
            .await
            .and_then(|row| row.map_or(Ok(0), |found| found.get_i64(0)))
            .map_err(|err| store_failure("count user accounts", &err))?;
        let total = u64::try_from(total)
            .map_err(|_| Error::internal(format!("store reported a negative count {total}")))?;

        let data = query_rows(self.store.as_ref(), deadline, sql::FIND_USER_ACCOUNTS, &window)
            .await
            .and_then(|rows| rows.iter().map(account_from_row).collect::<Result<Vec<_>, _>>())
            .map_err(|err| store_failure("find user accounts", &err))?;

        let has_next = query_row(
            self.store.as_ref(),
            deadline,
            sql::HAS_USER_ACCOUNTS_AFTER,
            &[next_position],
        )
        .await
        .and_then(|row| row.map_or(Ok(false), |found| found.get_bool(0)))
        .map_err(|err| store_failure("probe next page", &err))?;

        Ok(FindUserAccountsResult {
            options,
            total,
            has_next,
            data,
        })
    }

    async fn find_user_account_by_id(&self, id: &Id) -> Result<UserAccount, Error> {
        let deadline = Deadline::after(OPERATION_TIMEOUT);
        let row = query_row(self.store.as_ref(), deadline, sql::FIND_USER_ACCOUNT_BY_ID, &[
            Value::from(id.as_str()),
        ])
        .await
        .map_err(|err| store_failure("find user account", &err))?
        .ok_or_else(|| Error::not_found("user account does not exist"))?;

        account_from_row(&row).map_err(|err| store_failure("decode user account", &err))
    }
}

#[cfg(test)]
#[path = "user_account_service_tests.rs"]
mod tests;
