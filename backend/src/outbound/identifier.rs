//! Random identifier generation.

use rand::Rng;

use crate::domain::Id;
use crate::domain::ports::IdentifierGenerator;

/// Characters identifiers are drawn from.
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";

/// Length of every generated identifier.
pub const ID_LENGTH: usize = 64;

/// Generates identifiers of [`ID_LENGTH`] characters from [`ALPHABET`]
/// using the thread-local CSPRNG.
///
/// # Examples
/// ```
/// use accounts::domain::ports::IdentifierGenerator;
/// use accounts::outbound::identifier::{ID_LENGTH, RandomIdentifierGenerator};
///
/// let id = RandomIdentifierGenerator.generate();
/// assert_eq!(id.as_str().len(), ID_LENGTH);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdentifierGenerator;

impl IdentifierGenerator for RandomIdentifierGenerator {
    fn generate(&self) -> Id {
        let mut rng = rand::thread_rng();
        let value: String = (0..ID_LENGTH)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect();
        Id::new(value)
    }
}
