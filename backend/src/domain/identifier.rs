//! Opaque entity identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, immutable identifier token compared by value.
///
/// [`Id::EMPTY`] marks an entity whose identifier has not been assigned yet.
///
/// # Examples
/// ```
/// use accounts::domain::Id;
///
/// let id = Id::new("k2x9");
/// assert_eq!(id.as_str(), "k2x9");
/// assert!(Id::EMPTY.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Sentinel for "not yet assigned".
    pub const EMPTY: Self = Self(String::new());

    /// Wrap a raw identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the sentinel identifier.
    pub const fn empty() -> Self {
        Self::EMPTY
    }

    /// Whether the identifier is still the unassigned sentinel.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn empty_sentinel_matches_default() {
        assert_eq!(Id::empty(), Id::default());
        assert!(Id::EMPTY.is_empty());
    }

    #[rstest]
    fn equality_is_by_value() {
        assert_eq!(Id::new("abc"), Id::from("abc"));
        assert_ne!(Id::new("abc"), Id::new("abd"));
    }

    #[rstest]
    fn serialises_as_plain_string() {
        let value = serde_json::to_value(Id::new("abc")).expect("serialise id");
        assert_eq!(value, serde_json::json!("abc"));
    }
}
