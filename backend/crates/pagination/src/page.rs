//! JSON envelope for paginated responses.

use serde::{Deserialize, Serialize};

use crate::links::PageLinks;

/// One page of a collection together with its navigation links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Navigation links for this page.
    pub links: PageLinks,
    /// Number of items in the whole collection, ignoring pagination.
    pub total: u64,
    /// Items on this page, in collection order.
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Assemble a page from its parts.
    #[must_use]
    pub const fn new(links: PageLinks, total: u64, data: Vec<T>) -> Self {
        Self { links, total, data }
    }

    /// Convert every item on the page, keeping links and totals.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            links: self.links,
            total: self.total,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}
