//! Offset/limit pagination primitives shared by listing endpoints.
//!
//! [`FindOptions`] normalises the page window requested by a client,
//! [`PageLinks`] derives the `self`/`next`/`prev` navigation links for that
//! window, and [`Page`] is the JSON envelope returned by list endpoints.

mod links;
mod options;
mod page;

pub use links::{PageLinks, PaginationError};
pub use options::{DEFAULT_PAGE_SIZE, FindOptions, MAX_PAGE_SIZE};
pub use page::Page;
