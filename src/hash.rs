use fnv::FnvHasher;
use murmur3::{murmur3_32, murmur3_x64_128};
use std::fmt;
use std::hash::Hasher;
use std::io::Cursor;
use std::str::FromStr;

use crate::error::FilterError;

/// Digest strategy used to derive bit positions for an element.
///
/// All strategies feed the Kirsch-Mitzenmacher scheme: two base digest
/// values `h1`, `h2` are derived once per element and the i-th position is
/// `(h1 + i * h2) mod m`, which is statistically equivalent to `i`
/// independent hash functions. Positions are emitted in order and are not
/// deduplicated; the counting layer relies on coinciding indices being
/// touched twice.
///
/// Two filters can only be merged or share a remote bit vector when they
/// use the same strategy, so the variant doubles as the hash-method
/// identifier in the compatibility check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HashMethod {
    /// Two seeded evaluations of murmur3 32-bit.
    #[default]
    Murmur3Km,
    /// One murmur3 x64 128-bit digest split into two 64-bit halves.
    Murmur3X64Km,
    /// murmur3 paired with FNV-1a, the historical default of this crate's
    /// predecessor; kept so data written by it stays readable.
    Murmur3FnvKm,
}

const MURMUR_SECOND_SEED: u32 = 0x9747_b28c;

fn hash_murmur32(key: &[u8], seed: u32) -> u32 {
    let mut cursor = Cursor::new(key);
    murmur3_32(&mut cursor, seed).expect("Failed to compute Murmur3 hash")
}

fn hash_murmur128(key: &[u8]) -> u128 {
    let mut cursor = Cursor::new(key);
    murmur3_x64_128(&mut cursor, 0).expect("Failed to compute Murmur3 hash")
}

fn hash_fnv32(key: &[u8]) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.finish() as u32
}

impl HashMethod {
    /// Computes the ordered sequence of `hashes` positions in `[0, size)`
    /// for an element. Deterministic: identical inputs always yield the
    /// identical sequence, so `add` and `contains` probe the same slots.
    pub fn positions(
        &self,
        item: &[u8],
        hashes: usize,
        size: usize,
    ) -> Vec<usize> {
        debug_assert!(size > 0, "bit vector size must be positive");
        let (h1, h2) = self.base_pair(item);
        (0..hashes as u64)
            .map(|i| (h1.wrapping_add(i.wrapping_mul(h2)) % size as u64) as usize)
            .collect()
    }

    fn base_pair(&self, item: &[u8]) -> (u64, u64) {
        match self {
            HashMethod::Murmur3Km => (
                hash_murmur32(item, 0) as u64,
                hash_murmur32(item, MURMUR_SECOND_SEED) as u64,
            ),
            HashMethod::Murmur3X64Km => {
                let digest = hash_murmur128(item);
                ((digest >> 64) as u64, digest as u64)
            }
            HashMethod::Murmur3FnvKm => {
                (hash_murmur32(item, 0) as u64, hash_fnv32(item) as u64)
            }
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashMethod::Murmur3Km => "murmur3-km",
            HashMethod::Murmur3X64Km => "murmur3-x64-km",
            HashMethod::Murmur3FnvKm => "murmur3-fnv-km",
        };
        write!(f, "{name}")
    }
}

impl FromStr for HashMethod {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "murmur3-km" => Ok(HashMethod::Murmur3Km),
            "murmur3-x64-km" => Ok(HashMethod::Murmur3X64Km),
            "murmur3-fnv-km" => Ok(HashMethod::Murmur3FnvKm),
            other => Err(FilterError::InvalidConfig(format!(
                "unknown hash method: {other}"
            ))),
        }
    }
}
