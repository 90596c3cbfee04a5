//! Port for minting entity identifiers.

use crate::domain::Id;

/// Produces unique opaque identifiers for new entities.
#[cfg_attr(test, mockall::automock)]
pub trait IdentifierGenerator: Send + Sync {
    /// Generate a fresh identifier.
    fn generate(&self) -> Id;
}
