//! Page window options passed to every multi-result find operation.

use serde::Serialize;

/// Number of elements placed on a page when the client does not ask for a
/// specific size.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Largest number of elements a single page may hold.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Normalised offset/limit window.
///
/// ## Invariants
/// - `limit` is always within `1..=MAX_PAGE_SIZE`; a zero limit becomes
///   [`DEFAULT_PAGE_SIZE`] and larger values are clamped to
///   [`MAX_PAGE_SIZE`].
///
/// # Examples
/// ```
/// use pagination::{DEFAULT_PAGE_SIZE, FindOptions, MAX_PAGE_SIZE};
///
/// assert_eq!(FindOptions::new(0, 0).limit(), DEFAULT_PAGE_SIZE);
/// assert_eq!(FindOptions::new(500, 0).limit(), MAX_PAGE_SIZE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FindOptions {
    limit: u64,
    offset: u64,
}

impl FindOptions {
    /// Build options from a raw limit and offset, clamping the limit.
    #[must_use]
    pub const fn new(limit: u64, offset: u64) -> Self {
        let effective_limit = if limit == 0 {
            DEFAULT_PAGE_SIZE
        } else if limit > MAX_PAGE_SIZE {
            MAX_PAGE_SIZE
        } else {
            limit
        };

        Self {
            limit: effective_limit,
            offset,
        }
    }

    /// Build options from optional query parameters.
    #[must_use]
    pub fn from_query(limit: Option<u64>, start: Option<u64>) -> Self {
        Self::new(limit.unwrap_or(0), start.unwrap_or(0))
    }

    /// Number of elements that may be placed on the page.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of elements skipped before the page starts.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Offset of the page following this one.
    #[must_use]
    pub const fn next_offset(&self) -> u64 {
        self.offset.saturating_add(self.limit)
    }

    /// Offset of the page preceding this one, never below zero.
    #[must_use]
    pub const fn prev_offset(&self) -> u64 {
        self.offset.saturating_sub(self.limit)
    }
}

impl Default for FindOptions {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, DEFAULT_PAGE_SIZE)]
    #[case(1, 1)]
    #[case(20, 20)]
    #[case(100, 100)]
    #[case(101, MAX_PAGE_SIZE)]
    #[case(u64::MAX, MAX_PAGE_SIZE)]
    fn limit_is_defaulted_and_clamped(#[case] requested: u64, #[case] effective: u64) {
        assert_eq!(FindOptions::new(requested, 0).limit(), effective);
    }

    #[rstest]
    fn offset_is_kept_verbatim() {
        assert_eq!(FindOptions::new(10, 35).offset(), 35);
    }

    #[rstest]
    fn missing_query_parameters_use_defaults() {
        let options = FindOptions::from_query(None, None);
        assert_eq!(options, FindOptions::default());
        assert_eq!(options.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(options.offset(), 0);
    }

    #[rstest]
    #[case(40, 20, 20)]
    #[case(20, 20, 0)]
    #[case(5, 20, 0)]
    #[case(0, 20, 0)]
    fn prev_offset_never_underflows(
        #[case] offset: u64,
        #[case] limit: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(FindOptions::new(limit, offset).prev_offset(), expected);
    }

    #[rstest]
    fn next_offset_saturates() {
        assert_eq!(FindOptions::new(20, 40).next_offset(), 60);
        assert_eq!(FindOptions::new(20, u64::MAX).next_offset(), u64::MAX);
    }
}
