//! Domain primitives, aggregates and services.
//!
//! Purpose: Define the user account model, the ports the domain depends on
//! and the SQL-backed service implementing account creation and lookup.
//! Adapters live under `inbound` and `outbound`; nothing here knows about
//! HTTP or a concrete database driver.
//!
//! Public surface:
//! - Error (alias to `error::Error`) — transport-agnostic failure payload.
//! - ErrorCode (alias to `error::ErrorCode`) — stable error identifier.
//! - Id — opaque entity identifier.
//! - User / UserAccount — the account aggregate.
//! - SqlUserAccountService — the `UserAccountService` implementation.

pub mod error;
pub mod identifier;
pub mod logging;
pub mod ports;
pub mod request_id;
pub mod timing;
pub mod user_account;
pub mod user_account_queries;
pub mod user_account_service;

pub use self::error::{Error, ErrorCode, ErrorValidationError, FALLBACK_MESSAGE};
pub use self::identifier::Id;
pub use self::logging::{LoggingClock, LoggingIdentifierGenerator, LoggingUserAccountService};
pub use self::request_id::RequestId;
pub use self::user_account::{FindUserAccountsResult, User, UserAccount};
pub use self::user_account_service::{CreateStage, OPERATION_TIMEOUT, SqlUserAccountService};

/// Convenient domain result alias.
///
/// # Examples
/// ```
/// use accounts::domain::{DomainResult, Error};
///
/// fn lookup() -> DomainResult<()> {
///     Err(Error::not_found("user account does not exist"))
/// }
/// # assert!(lookup().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
