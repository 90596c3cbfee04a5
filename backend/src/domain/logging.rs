//! Logging decorators for the service-level ports.
//!
//! Each wrapper implements the same port as the value it wraps, forwards the
//! call and emits one `debug` event with timings. Failed service calls emit
//! an extra `error` event with the same fields.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use pagination::FindOptions;
use tracing::{debug, error};

use super::ports::{IdentifierGenerator, UserAccountService};
use super::timing::{Timing, track};
use super::{Error, FindUserAccountsResult, Id, RequestId, UserAccount};

fn request_id() -> String {
    RequestId::current().map_or_else(String::new, |id| id.to_string())
}

fn log_call<T: std::fmt::Debug>(
    call: &str,
    before: &dyn std::fmt::Debug,
    outcome: &Result<T, Error>,
    timing: &Timing,
) {
    let request_id = request_id();
    let (after, failure) = match outcome {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err)),
    };
    debug!(
        scope = "user_account_service",
        call,
        request_id = %request_id,
        before = ?before,
        after = ?after,
        error = ?failure,
        start = %timing.start,
        end = %timing.end,
        elapsed_ms = timing.elapsed_ms(),
        "user account service call"
    );
    if let Some(err) = failure {
        error!(
            scope = "user_account_service",
            call,
            request_id = %request_id,
            before = ?before,
            error = ?err,
            start = %timing.start,
            end = %timing.end,
            elapsed_ms = timing.elapsed_ms(),
            "user account service call failed"
        );
    }
}

/// Logs every [`UserAccountService`] call with its input and result.
///
/// The input of `create_user_account` is cloned before the call so the
/// event shows the account both before and after identifiers are assigned.
#[derive(Clone)]
pub struct LoggingUserAccountService {
    inner: Arc<dyn UserAccountService>,
    clock: Arc<dyn Clock>,
}

impl LoggingUserAccountService {
    /// Wrap `inner`, timestamping events with `clock`.
    pub fn new(inner: Arc<dyn UserAccountService>, clock: Arc<dyn Clock>) -> Self {
        Self { inner, clock }
    }
}

#[async_trait]
impl UserAccountService for LoggingUserAccountService {
    async fn create_user_account(&self, account: UserAccount) -> Result<UserAccount, Error> {
        let before = account.clone();
        let (outcome, timing) =
            track(self.clock.as_ref(), self.inner.create_user_account(account)).await;
        log_call("create_user_account", &before, &outcome, &timing);
        outcome
    }

    async fn find_user_accounts(
        &self,
        options: FindOptions,
    ) -> Result<FindUserAccountsResult, Error> {
        let (outcome, timing) =
            track(self.clock.as_ref(), self.inner.find_user_accounts(options)).await;
        log_call("find_user_accounts", &options, &outcome, &timing);
        outcome
    }

    async fn find_user_account_by_id(&self, id: &Id) -> Result<UserAccount, Error> {
        let (outcome, timing) =
            track(self.clock.as_ref(), self.inner.find_user_account_by_id(id)).await;
        log_call("find_user_account_by_id", id, &outcome, &timing);
        outcome
    }
}

/// Logs every identifier handed out.
pub struct LoggingIdentifierGenerator {
    inner: Arc<dyn IdentifierGenerator>,
}

impl LoggingIdentifierGenerator {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn IdentifierGenerator>) -> Self {
        Self { inner }
    }
}

impl IdentifierGenerator for LoggingIdentifierGenerator {
    fn generate(&self) -> Id {
        let id = self.inner.generate();
        debug!(scope = "identifier", id = %id, "identifier generated");
        id
    }
}

/// Logs every instant read from the wrapped clock.
pub struct LoggingClock {
    inner: Arc<dyn Clock>,
}

impl LoggingClock {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn Clock>) -> Self {
        Self { inner }
    }
}

impl Clock for LoggingClock {
    fn local(&self) -> DateTime<Local> {
        let now = self.inner.local();
        debug!(scope = "clock", now = %now, "local time read");
        now
    }

    fn utc(&self) -> DateTime<Utc> {
        let now = self.inner.utc();
        debug!(scope = "clock", now = %now, "utc time read");
        now
    }
}
