//! Session identifier generation.

use rand::RngCore;

/// The 64 symbols session identifiers are drawn from.
pub const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Default identifier length (24 chars, 144 bits of entropy).
pub const DEFAULT_ID_LENGTH: usize = 24;

/// Produces fixed-length random identifiers.
///
/// The generator is stateless apart from the configured length and knows
/// nothing about identifiers already in use; uniqueness is the manager's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdGenerator {
    length: usize,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_LENGTH)
    }
}

impl IdGenerator {
    /// Create a generator for identifiers of `length` characters.
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    /// Configured identifier length.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Generate a fresh identifier.
    pub fn generate(&self) -> String {
        let mut bytes = vec![0u8; self.length];
        rand::rng().fill_bytes(&mut bytes);
        // 256 is a multiple of 64, so masking keeps the distribution uniform.
        bytes
            .into_iter()
            .map(|b| ALPHABET[(b & 0x3F) as usize] as char)
            .collect()
    }

    /// Check that `id` has the configured length and only uses the alphabet.
    pub fn is_valid(&self, id: &str) -> bool {
        id.len() == self.length && id.bytes().all(|b| ALPHABET.contains(&b))
    }
}
