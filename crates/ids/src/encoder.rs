//! Rendering of issued ids
//!
//! Ids leave the allocator as strings. The plain encoder prints the decimal
//! value; the obfuscating encoder runs a keyed, reversible 64-bit permutation
//! first so that public ids do not reveal creation order or volume. Both are
//! bijections, so encoding never affects uniqueness.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use folio_core::{FolioError, FolioResult};
use std::fmt::Debug;

/// Reversible id rendering
pub trait IdEncoder: Send + Sync + Debug {
    /// Render an issued id
    fn encode(&self, value: u64) -> String;

    /// Recover the issued id from its rendering
    fn decode(&self, encoded: &str) -> FolioResult<u64>;
}

/// Decimal rendering
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainEncoder;

impl IdEncoder for PlainEncoder {
    fn encode(&self, value: u64) -> String {
        value.to_string()
    }

    fn decode(&self, encoded: &str) -> FolioResult<u64> {
        encoded
            .parse::<u64>()
            .map_err(|e| FolioError::invalid_input(format!("malformed id '{}': {}", encoded, e)))
    }
}

/// Odd multiplier (golden ratio constant); odd means invertible mod 2^64
const MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// Keyed permutation rendered as 11 URL-safe base64 characters
#[derive(Clone, Copy)]
pub struct ObfuscatingEncoder {
    key: u64,
    inverse: u64,
}

impl ObfuscatingEncoder {
    /// Create an encoder for a key
    pub fn new(key: u64) -> Self {
        ObfuscatingEncoder {
            key,
            inverse: modular_inverse(MULTIPLIER),
        }
    }

    fn permute(&self, value: u64) -> u64 {
        let mixed = (value ^ self.key).wrapping_mul(MULTIPLIER);
        mixed ^ (mixed >> 32)
    }

    fn unpermute(&self, value: u64) -> u64 {
        let mixed = value ^ (value >> 32);
        mixed.wrapping_mul(self.inverse) ^ self.key
    }
}

/// Inverse of an odd number modulo 2^64 (Newton iteration, 3 -> 96 bits)
fn modular_inverse(odd: u64) -> u64 {
    let mut inv = odd;
    for _ in 0..5 {
        inv = inv.wrapping_mul(2u64.wrapping_sub(odd.wrapping_mul(inv)));
    }
    inv
}

impl IdEncoder for ObfuscatingEncoder {
    fn encode(&self, value: u64) -> String {
        URL_SAFE_NO_PAD.encode(self.permute(value).to_be_bytes())
    }

    fn decode(&self, encoded: &str) -> FolioResult<u64> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| FolioError::invalid_input(format!("malformed id '{}': {}", encoded, e)))?;
        let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
            FolioError::invalid_input(format!("malformed id '{}': wrong length", encoded))
        })?;
        Ok(self.unpermute(u64::from_be_bytes(raw)))
    }
}

// Never print the key
impl Debug for ObfuscatingEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfuscatingEncoder").finish_non_exhaustive()
    }
}
