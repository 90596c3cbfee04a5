//! Driving port for managing user accounts.
//!
//! Inbound adapters call this port; the SQL-backed service and its logging
//! decorator implement it.

use async_trait::async_trait;
use pagination::FindOptions;

use crate::domain::{Error, FindUserAccountsResult, Id, UserAccount};

/// Use-case port for creating and reading user accounts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserAccountService: Send + Sync {
    /// Persist a new account and its user, returning them with identifiers
    /// and creation timestamps assigned.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::Conflict`] when the username is taken,
    /// [`crate::domain::ErrorCode::InternalError`] for store failures.
    async fn create_user_account(&self, account: UserAccount) -> Result<UserAccount, Error>;

    /// Return one page of accounts.
    async fn find_user_accounts(
        &self,
        options: FindOptions,
    ) -> Result<FindUserAccountsResult, Error>;

    /// Return the account with the given identifier.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::NotFound`] when no such account exists.
    async fn find_user_account_by_id(&self, id: &Id) -> Result<UserAccount, Error>;
}
