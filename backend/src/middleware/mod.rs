//! Request middleware.
//!
//! Purpose: define middleware components for request lifecycle concerns such
//! as correlation identifiers and access logging.

pub mod track_requests;

pub use track_requests::{REQUEST_ID_HEADER, TrackRequests};
