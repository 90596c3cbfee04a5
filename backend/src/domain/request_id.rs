//! Request-scoped correlation identifier.
//!
//! `RequestId` follows a request through the system. The HTTP middleware
//! places it in task-local storage, so handlers and the services they call can
//! tag log events without threading it through every signature.
//!
//! Identifiers are opaque tokens: upstream services may send UUIDs, nanoids or
//! any other URL-safe token of at most [`RequestId::MAX_LEN`] characters.
//! Freshly generated identifiers are UUID v4 strings.
//!
//! Tokio task-local variables are not inherited across spawned tasks. Use
//! [`RequestId::scope`] when spawning new tasks.

use std::future::Future;
use std::sync::Arc;

use tokio::task_local;
use uuid::Uuid;

task_local! {
    pub(crate) static REQUEST_ID: RequestId;
}

/// Reasons an incoming identifier is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequestId {
    /// Nothing but whitespace.
    #[error("request identifier is empty")]
    Empty,
    /// Longer than [`RequestId::MAX_LEN`].
    #[error("request identifier is too long")]
    TooLong,
    /// Contains a character outside `A-Z a-z 0-9 - _ . : ~`.
    #[error("request identifier contains an unsupported character")]
    InvalidCharacter,
}

/// Per-request identifier exposed via task-local storage.
///
/// # Examples
/// ```
/// use accounts::domain::RequestId;
///
/// async fn handler() {
///     if let Some(id) = RequestId::current() {
///         println!("request id: {id}");
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(Arc<str>);

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '~')
}

impl RequestId {
    /// Longest identifier accepted from a caller.
    pub const MAX_LEN: usize = 128;

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    /// The identifier in scope, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        REQUEST_ID.try_with(Clone::clone).ok()
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Run `fut` with `request_id` in scope.
    ///
    /// # Examples
    /// ```
    /// use accounts::domain::RequestId;
    ///
    /// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
    /// let id: RequestId = "V1StGXR8_Z5jdHi6B-myT".parse().expect("valid token");
    /// let observed = RequestId::scope(id.clone(), async { RequestId::current() }).await;
    /// assert_eq!(observed, Some(id));
    /// # });
    /// ```
    pub async fn scope<Fut>(request_id: Self, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        REQUEST_ID.scope(request_id, fut).await
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = InvalidRequestId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(InvalidRequestId::Empty);
        }
        if token.len() > Self::MAX_LEN {
            return Err(InvalidRequestId::TooLong);
        }
        if !token.chars().all(is_token_char) {
            return Err(InvalidRequestId::InvalidCharacter);
        }
        Ok(Self(token.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn current_reflects_scope() {
        let expected = RequestId::generate();
        let observed =
            RequestId::scope(expected.clone(), async move { RequestId::current() }).await;
        assert_eq!(observed, Some(expected));
    }

    #[tokio::test]
    async fn current_is_none_out_of_scope() {
        assert!(RequestId::current().is_none());
    }

    #[test]
    fn generated_identifiers_are_uuids() {
        let id = RequestId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[rstest]
    #[case("67e55044-10b1-426f-9247-bb680e5fe0c8")]
    #[case("V1StGXR8_Z5jdHi6B-myT")]
    #[case("edge.lb:01HZX3~a")]
    fn opaque_tokens_are_accepted(#[case] token: &str) {
        let id: RequestId = token.parse().expect("valid token");
        assert_eq!(id.as_str(), token);
    }

    #[test]
    fn parsing_trims_surrounding_whitespace() {
        let id: RequestId = " V1StGXR8_Z5jdHi6B-myT ".parse().expect("valid token");
        assert_eq!(id.to_string(), "V1StGXR8_Z5jdHi6B-myT");
    }

    #[rstest]
    #[case("", InvalidRequestId::Empty)]
    #[case("   ", InvalidRequestId::Empty)]
    #[case("two words", InvalidRequestId::InvalidCharacter)]
    #[case("semi;colon", InvalidRequestId::InvalidCharacter)]
    fn unusable_tokens_are_rejected(#[case] token: &str, #[case] expected: InvalidRequestId) {
        assert_eq!(token.parse::<RequestId>(), Err(expected));
    }

    #[test]
    fn overlong_tokens_are_rejected() {
        let token = "a".repeat(RequestId::MAX_LEN + 1);
        assert_eq!(token.parse::<RequestId>(), Err(InvalidRequestId::TooLong));
    }
}
