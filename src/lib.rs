//! Probabilistic set-membership structures with interchangeable local and
//! shared-Redis bit storage.
//!
//! Three filter variants are layered on one storage contract:
//!    * [`BloomFilter`] - plain bits, add/contains/union/intersect plus a
//!      population estimate.
//!    * [`CountingBloomFilter`] - saturating multi-bit counters instead of
//!      bits, which makes removal and occurrence estimates possible.
//!    * [`ExpiringBloomFilter`] - a counting filter plus a per-element TTL
//!      ledger, aimed at cache invalidation (reads report what got cached,
//!      writes learn whether an invalidation is due).
//!
//! Storage:
//!     * [`LocalBitVector`] owns its bytes; everything stays in-process.
//!     * [`RedisBitVector`] (feature `redis`, default on) keeps the bytes
//!       in a shared Redis key, so several processes can mutate and
//!       observe one filter. Per-element operations are pipelined into a
//!       single round trip, and bulk reads can opt into replica reads.
//!
//! Positions are derived with Kirsch-Mitzenmacher double hashing: two base
//! digests per element instead of k independent hash functions.
//!
//! Known limitations, by construction:
//!     * False positives happen; false negatives only after removals.
//!     * Expiration is approximate - entries linger until a sweep or a
//!       write touches them.
//!     * Durability is whatever the backing store provides.

pub mod config;
mod counting;
mod error;
mod expiring;
mod filter;
mod hash;
#[cfg(feature = "redis")]
mod redis_storage;
pub mod snapshot;
mod storage;

pub use config::{
    CounterWidth, FilterConfig, FilterConfigBuilder, FilterConfigBuilderError,
    FilterParams, optimal_k, optimal_m, optimal_n, optimal_p,
};
pub use counting::CountingBloomFilter;
pub use error::{FilterError, Result};
pub use expiring::ExpiringBloomFilter;
pub use filter::BloomFilter;
pub use hash::HashMethod;
#[cfg(feature = "redis")]
pub use redis_storage::RedisBitVector;
pub use storage::{BitVector, LocalBitVector, ReadConsistency};
