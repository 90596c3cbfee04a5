//! Tests for the SQL-backed user account service.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::domain::ErrorCode;
use crate::outbound::store::{LoggingStore, MetricsStore};
use crate::test_support::{
    FixedClock, MetricEvent, RecordingQueryMetrics, RecordingStore, Scripted, SequentialIds,
    StoreCall, StoreOperation,
};

fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

#[fixture]
fn store() -> RecordingStore {
    RecordingStore::new()
}

fn service(store: &RecordingStore) -> SqlUserAccountService<RecordingStore> {
    SqlUserAccountService::new(
        Arc::new(store.clone()),
        Arc::new(SequentialIds::new("id")),
        Arc::new(FixedClock(fixture_time())),
    )
}

fn new_account() -> UserAccount {
    UserAccount::new("jdoe", User::new("John", "Doe"))
}

fn username_taken(store: &RecordingStore, taken: bool) {
    store.respond(
        sql::USERNAME_EXISTS,
        Scripted::Rows(vec![Row::new(vec![Value::Bool(taken)])]),
    );
}

fn account_row(id: &str, username: &str, user_id: &str) -> Row {
    let millis = fixture_time().timestamp_millis();
    Row::new(vec![
        Value::from(id),
        Value::from(username),
        Value::Int(millis),
        Value::from(user_id),
        Value::from("Ada"),
        Value::from("Lovelace"),
        Value::Int(millis),
    ])
}

fn prepared(query: &str) -> StoreCall {
    StoreCall::Prepare {
        query: query.to_owned(),
        in_tx: true,
    }
}

fn closed(query: &str) -> StoreCall {
    StoreCall::Close {
        query: query.to_owned(),
    }
}

#[rstest]
#[tokio::test]
async fn create_assigns_ids_and_timestamps_then_commits(store: RecordingStore) {
    username_taken(&store, false);

    let created = service(&store)
        .create_user_account(new_account())
        .await
        .expect("account created");

    assert_eq!(created.user().id().as_str(), "id-1");
    assert_eq!(created.id().as_str(), "id-2");
    assert_eq!(created.created_at(), fixture_time());
    assert_eq!(created.user().created_at(), fixture_time());

    let millis = fixture_time().timestamp_millis();
    assert_eq!(
        store.calls(),
        vec![
            StoreCall::BeginTx,
            prepared(sql::USERNAME_EXISTS),
            StoreCall::QueryRow {
                query: sql::USERNAME_EXISTS.to_owned(),
                args: vec![Value::from("jdoe")],
            },
            closed(sql::USERNAME_EXISTS),
            prepared(sql::INSERT_USER),
            StoreCall::Exec {
                query: sql::INSERT_USER.to_owned(),
                args: vec![
                    Value::from("id-1"),
                    Value::from("John"),
                    Value::from("Doe"),
                    Value::Int(millis),
                ],
            },
            closed(sql::INSERT_USER),
            prepared(sql::INSERT_USER_ACCOUNT),
            StoreCall::Exec {
                query: sql::INSERT_USER_ACCOUNT.to_owned(),
                args: vec![
                    Value::from("id-2"),
                    Value::from("jdoe"),
                    Value::from("id-1"),
                    Value::Int(millis),
                ],
            },
            closed(sql::INSERT_USER_ACCOUNT),
            StoreCall::Commit,
        ]
    );
    assert_eq!(store.committed().len(), 2);
    assert_eq!(store.tx_options(), vec![CREATE_TX_OPTIONS]);
    assert_eq!(
        CREATE_TX_OPTIONS.isolation,
        Some(crate::domain::ports::IsolationLevel::ReadCommitted)
    );
}

#[rstest]
#[tokio::test]
async fn taken_username_conflicts_without_writing(store: RecordingStore) {
    username_taken(&store, true);

    let error = service(&store)
        .create_user_account(new_account())
        .await
        .expect_err("username is taken");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.message(),
        "user account with username \"jdoe\" already exists"
    );
    assert_eq!(store.count(&StoreCall::Rollback), 1);
    assert_eq!(store.count(&StoreCall::Commit), 0);
    assert!(store.committed().is_empty());
}

#[rstest]
#[tokio::test]
async fn second_insert_failure_rolls_back_once(store: RecordingStore) {
    username_taken(&store, false);
    store.respond(
        sql::INSERT_USER_ACCOUNT,
        Scripted::Fail(StoreError::query("duplicate key value")),
    );

    let error = service(&store)
        .create_user_account(new_account())
        .await
        .expect_err("second insert fails");

    assert_eq!(error.code(), ErrorCode::InternalError);
    assert!(error.message().contains("duplicate key value"));
    assert_eq!(store.count(&StoreCall::Rollback), 1);
    assert_eq!(store.count(&StoreCall::Commit), 0);
    assert!(store.committed().is_empty());
}

#[rstest]
#[tokio::test]
async fn rollback_failure_supersedes_original_error(store: RecordingStore) {
    username_taken(&store, true);
    store.fail(
        StoreOperation::Rollback,
        StoreError::rollback("connection reset"),
    );

    let error = service(&store)
        .create_user_account(new_account())
        .await
        .expect_err("rollback fails");

    assert_eq!(error.code(), ErrorCode::InternalError);
    assert!(error.message().contains("connection reset"));
    assert_eq!(
        error.details(),
        Some(&json!({
            "cause": {
                "code": "conflict",
                "message": "user account with username \"jdoe\" already exists"
            }
        }))
    );
}

#[rstest]
#[tokio::test]
async fn commit_failure_is_terminal(store: RecordingStore) {
    username_taken(&store, false);
    store.fail(StoreOperation::Commit, StoreError::commit("serialization failure"));

    let error = service(&store)
        .create_user_account(new_account())
        .await
        .expect_err("commit fails");

    assert_eq!(error.code(), ErrorCode::InternalError);
    assert_eq!(store.count(&StoreCall::Rollback), 0);
    assert!(store.committed().is_empty());
}

#[rstest]
#[tokio::test]
async fn begin_failure_touches_nothing_else(store: RecordingStore) {
    store.fail(StoreOperation::BeginTx, StoreError::connection("refused"));

    let error = service(&store)
        .create_user_account(new_account())
        .await
        .expect_err("begin fails");

    assert_eq!(error.code(), ErrorCode::InternalError);
    assert_eq!(store.calls(), vec![StoreCall::BeginTx]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_store_hits_the_deadline_and_rolls_back(store: RecordingStore) {
    username_taken(&store, false);
    store.set_latency(OPERATION_TIMEOUT + Duration::from_millis(500));

    let error = service(&store)
        .create_user_account(new_account())
        .await
        .expect_err("deadline exceeded");

    assert_eq!(error.code(), ErrorCode::InternalError);
    assert!(error.message().contains("deadline"));
    assert_eq!(store.count(&StoreCall::Rollback), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_commit_is_cut_off_at_the_deadline_through_the_decorators(store: RecordingStore) {
    username_taken(&store, false);
    store.set_commit_latency(OPERATION_TIMEOUT * 3);
    let metrics = RecordingQueryMetrics::default();
    let clock: Arc<dyn mockable::Clock> = Arc::new(FixedClock(fixture_time()));
    let decorated = LoggingStore::new(
        MetricsStore::new(store.clone(), Arc::new(metrics.clone())),
        Arc::clone(&clock),
    );
    let service = SqlUserAccountService::new(
        Arc::new(decorated),
        Arc::new(SequentialIds::new("id")),
        clock,
    );
    let started = tokio::time::Instant::now();

    let error = service
        .create_user_account(new_account())
        .await
        .expect_err("commit runs past the deadline");

    assert!(started.elapsed() < OPERATION_TIMEOUT * 2);
    assert_eq!(error.code(), ErrorCode::InternalError);
    assert!(error.message().contains("deadline"));
    assert!(store.committed().is_empty());
    assert_eq!(store.count(&StoreCall::Commit), 1);
    assert_eq!(store.count(&StoreCall::Rollback), 0);
    assert!(metrics.events().contains(&MetricEvent::Error("COMMIT".to_owned())));
}

#[rstest]
#[tokio::test]
async fn find_by_id_decodes_the_joined_row(store: RecordingStore) {
    store.respond(
        sql::FIND_USER_ACCOUNT_BY_ID,
        Scripted::Rows(vec![account_row("acc-1", "ada", "usr-1")]),
    );

    let account = service(&store)
        .find_user_account_by_id(&Id::new("acc-1"))
        .await
        .expect("account found");

    assert_eq!(account.id().as_str(), "acc-1");
    assert_eq!(account.username(), "ada");
    assert_eq!(account.user().id().as_str(), "usr-1");
    assert_eq!(account.user().first_name(), "Ada");
    assert_eq!(account.created_at(), fixture_time());
    assert_eq!(
        store.count(&StoreCall::QueryRow {
            query: sql::FIND_USER_ACCOUNT_BY_ID.to_owned(),
            args: vec![Value::from("acc-1")],
        }),
        1
    );
}

#[rstest]
#[tokio::test]
async fn find_by_unknown_id_is_not_found(store: RecordingStore) {
    let error = service(&store)
        .find_user_account_by_id(&Id::new("missing"))
        .await
        .expect_err("no such account");

    assert_eq!(error.code(), ErrorCode::NotFound);
    assert_eq!(error.message(), "user account does not exist");
}

#[rstest]
#[tokio::test]
async fn query_error_wins_over_close_error(store: RecordingStore) {
    store.respond(
        sql::FIND_USER_ACCOUNT_BY_ID,
        Scripted::Fail(StoreError::query("relation does not exist")),
    );
    store.fail(StoreOperation::Close, StoreError::connection("gone"));

    let error = service(&store)
        .find_user_account_by_id(&Id::new("acc-1"))
        .await
        .expect_err("query fails");

    assert!(error.message().contains("relation does not exist"));
    assert!(!error.message().contains("gone"));
}

#[rstest]
#[tokio::test]
async fn close_error_surfaces_when_the_query_succeeded(store: RecordingStore) {
    store.fail(StoreOperation::Close, StoreError::connection("gone"));

    let error = service(&store)
        .find_user_account_by_id(&Id::new("acc-1"))
        .await
        .expect_err("close fails");

    assert_eq!(error.code(), ErrorCode::InternalError);
    assert!(error.message().contains("gone"));
}

#[rstest]
#[tokio::test]
async fn find_many_counts_pages_and_probes(store: RecordingStore) {
    store.respond(
        sql::COUNT_USER_ACCOUNTS,
        Scripted::Rows(vec![Row::new(vec![Value::Int(5)])]),
    );
    store.respond(
        sql::FIND_USER_ACCOUNTS,
        Scripted::Rows(vec![
            account_row("acc-3", "c", "usr-3"),
            account_row("acc-4", "d", "usr-4"),
        ]),
    );
    store.respond(
        sql::HAS_USER_ACCOUNTS_AFTER,
        Scripted::Rows(vec![Row::new(vec![Value::Bool(true)])]),
    );
    let options = FindOptions::new(2, 2);

    let result = service(&store)
        .find_user_accounts(options)
        .await
        .expect("page found");

    assert_eq!(result.options, options);
    assert_eq!(result.total, 5);
    assert!(result.has_next);
    let ids: Vec<&str> = result.data.iter().map(|account| account.id().as_str()).collect();
    assert_eq!(ids, vec!["acc-3", "acc-4"]);
    assert_eq!(
        store.count(&StoreCall::QueryRows {
            query: sql::FIND_USER_ACCOUNTS.to_owned(),
            args: vec![Value::Int(2), Value::Int(2)],
        }),
        1
    );
    assert_eq!(
        store.count(&StoreCall::QueryRow {
            query: sql::HAS_USER_ACCOUNTS_AFTER.to_owned(),
            args: vec![Value::Int(4)],
        }),
        1
    );
    assert_eq!(store.count(&StoreCall::BeginTx), 0);
}

#[rstest]
#[tokio::test]
async fn find_many_on_empty_store(store: RecordingStore) {
    let result = service(&store)
        .find_user_accounts(FindOptions::default())
        .await
        .expect("empty page");

    assert_eq!(result.total, 0);
    assert!(!result.has_next);
    assert!(result.data.is_empty());
}

#[rstest]
#[tokio::test]
async fn find_many_rejects_offsets_beyond_the_store_range(store: RecordingStore) {
    let error = service(&store)
        .find_user_accounts(FindOptions::new(20, u64::MAX))
        .await
        .expect_err("offset out of range");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert!(store.calls().is_empty());
}
