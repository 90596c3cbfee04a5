//! Navigation links for offset-paginated listings.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::options::{DEFAULT_PAGE_SIZE, FindOptions};

/// Errors raised while deriving navigation links.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    /// The path prefix could not be resolved against the base URL.
    #[error("invalid path prefix `{path}`: {source}")]
    InvalidPath {
        /// Path prefix supplied by the caller.
        path: String,
        /// Parse failure reported by the URL resolver.
        source: url::ParseError,
    },
}

/// Links for dynamic navigation through a paginated collection.
///
/// `next` and `prev` are omitted from the JSON form when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    /// General link to the API.
    pub base: String,
    /// Link to the collection itself, without pagination parameters.
    #[serde(rename = "self")]
    pub self_link: String,
    /// Link to the next page, when more data exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Link to the previous page, when the current page is not the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

impl PageLinks {
    /// Derive navigation links for the window described by `options`.
    ///
    /// - `limit` is added to `next`/`prev` only when it differs from
    ///   [`DEFAULT_PAGE_SIZE`].
    /// - `prev` is present only when the offset is positive; its `start` is
    ///   clamped at zero and omitted when zero.
    /// - `next` is present only when `has_next` is set; its `start` is
    ///   `offset + limit`.
    ///
    /// # Errors
    /// Returns [`PaginationError::InvalidPath`] when `path_prefix` cannot be
    /// joined onto `base_url`.
    ///
    /// # Examples
    /// ```
    /// use pagination::{FindOptions, PageLinks};
    /// use url::Url;
    ///
    /// let base = Url::parse("http://localhost:8080/").expect("valid URL");
    /// let links = PageLinks::build(&base, "/api/v1/user-accounts", FindOptions::new(20, 40), true)
    ///     .expect("links build");
    /// assert_eq!(links.prev.as_deref(), Some("http://localhost:8080/api/v1/user-accounts?start=20"));
    /// assert_eq!(links.next.as_deref(), Some("http://localhost:8080/api/v1/user-accounts?start=60"));
    /// ```
    pub fn build(
        base_url: &Url,
        path_prefix: &str,
        options: FindOptions,
        has_next: bool,
    ) -> Result<Self, PaginationError> {
        let self_url = base_url
            .join(path_prefix)
            .map_err(|source| PaginationError::InvalidPath {
                path: path_prefix.to_owned(),
                source,
            })?;

        let offset = options.offset();
        let prev = (offset > 0).then(|| page_url(&self_url, options.limit(), options.prev_offset()));
        let next = has_next.then(|| page_url(&self_url, options.limit(), options.next_offset()));

        Ok(Self {
            base: base_url.to_string(),
            self_link: self_url.to_string(),
            next,
            prev,
        })
    }
}

fn page_url(self_url: &Url, limit: u64, start: u64) -> String {
    let mut pairs = Vec::with_capacity(2);
    if limit != DEFAULT_PAGE_SIZE {
        pairs.push(("limit", limit.to_string()));
    }
    if start > 0 {
        pairs.push(("start", start.to_string()));
    }

    let mut url = self_url.clone();
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    url.to_string()
}
