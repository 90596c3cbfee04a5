//! User and user account aggregates.
//!
//! Accounts are built with [`Id::EMPTY`] identifiers by inbound adapters and
//! receive their identifiers and creation timestamps exactly once, inside the
//! create transaction. Nothing mutates them afterwards.

use chrono::{DateTime, Utc};
use pagination::FindOptions;

use super::Id;

/// The person behind an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: Id,
    first_name: String,
    last_name: String,
    created_at: DateTime<Utc>,
}

impl User {
    /// Build a user that has not been persisted yet.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: Id::EMPTY,
            first_name: first_name.into(),
            last_name: last_name.into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Rebuild a persisted user from stored values.
    pub fn from_parts(
        id: Id,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            created_at,
        }
    }

    /// Unique identifier.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Given name.
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    /// Family name.
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// Time the user was persisted.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn assign(&mut self, id: Id, created_at: DateTime<Utc>) {
        self.id = id;
        self.created_at = created_at;
    }
}

/// Account owned by exactly one [`User`].
///
/// The account holds its user by value, so `clone` produces a deep copy.
///
/// # Examples
/// ```
/// use accounts::domain::{User, UserAccount};
///
/// let account = UserAccount::new("jdoe", User::new("John", "Doe"));
/// assert!(account.id().is_empty());
/// assert_eq!(account.user().first_name(), "John");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    id: Id,
    username: String,
    user: User,
    created_at: DateTime<Utc>,
}

impl UserAccount {
    /// Build an account that has not been persisted yet.
    pub fn new(username: impl Into<String>, user: User) -> Self {
        Self {
            id: Id::EMPTY,
            username: username.into(),
            user,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Rebuild a persisted account from stored values.
    pub fn from_parts(
        id: Id,
        username: impl Into<String>,
        user: User,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            user,
            created_at,
        }
    }

    /// Unique identifier.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Unique login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Owning person.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Time the account was persisted.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn user_mut(&mut self) -> &mut User {
        &mut self.user
    }

    pub(crate) fn assign(&mut self, id: Id, created_at: DateTime<Utc>) {
        self.id = id;
        self.created_at = created_at;
    }
}

/// Outcome of a paginated account search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindUserAccountsResult {
    /// Window that was applied.
    pub options: FindOptions,
    /// Number of accounts ignoring pagination.
    pub total: u64,
    /// Whether another page follows this one.
    pub has_next: bool,
    /// Accounts on this page, in creation order.
    pub data: Vec<UserAccount>,
}
