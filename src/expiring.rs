use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::FilterConfig;
use crate::counting::CountingBloomFilter;
use crate::error::Result;
use crate::filter::BloomFilter;
use crate::storage::{BitVector, LocalBitVector};

/// Counting Bloom filter with per-element time-to-live bookkeeping, built
/// for cache invalidation: reads report what got cached and for how long,
/// writes learn whether an invalidation is due.
///
/// Each live element carries an absolute expiration instant in a ledger
/// that is exact per element, at O(live elements) memory, while membership
/// itself stays probabilistic. Expiration is approximate: entries outlive
/// their deadline until the next sweep or until a write touches them, and
/// both the lazy and the active path converge the counting filter back
/// down over time.
pub struct ExpiringBloomFilter<V: BitVector> {
    filter: CountingBloomFilter<V>,
    ledger: HashMap<Vec<u8>, Instant>,
    sweep_interval: Duration,
    last_sweep: Instant,
}

impl ExpiringBloomFilter<LocalBitVector> {
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let filter = CountingBloomFilter::from_config(config)?;
        Ok(Self::with_filter(filter, config.sweep_interval))
    }
}

impl<V: BitVector> ExpiringBloomFilter<V> {
    /// Wraps a prepared counting filter. `sweep_interval` tunes how often
    /// `report_read` opportunistically runs the active sweep; the
    /// externally observable contract does not depend on it.
    pub fn with_filter(
        filter: CountingBloomFilter<V>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            filter,
            ledger: HashMap::new(),
            sweep_interval,
            last_sweep: Instant::now(),
        }
    }

    pub fn counting_filter(&self) -> &CountingBloomFilter<V> {
        &self.filter
    }

    /// Reports that an element was read and cached for `ttl`.
    ///
    /// A first read increments the underlying counting filter and opens a
    /// ledger entry; a repeated read only refreshes the deadline, since a
    /// refresh is not a new occurrence.
    pub fn report_read(&mut self, item: &[u8], ttl: Duration) -> Result<()> {
        self.maybe_sweep();
        let expires_at = Instant::now() + ttl;
        if let Some(entry) = self.ledger.get_mut(item) {
            *entry = expires_at;
        } else {
            self.filter.add_and_estimate_count(item)?;
            self.ledger.insert(item.to_vec(), expires_at);
        }
        Ok(())
    }

    /// Reports a write on an element.
    ///
    /// Returns the remaining TTL when the element was live and unexpired,
    /// signalling that the caller holds a stale cached copy and must
    /// invalidate it; returns `None` otherwise. In both cases the ledger
    /// entry is retired and the counting filter decremented; cleanup is
    /// best-effort and never masks the returned signal.
    pub fn report_write(&mut self, item: &[u8]) -> Result<Option<Duration>> {
        let Some(&expires_at) = self.ledger.get(item) else {
            return Ok(None);
        };

        let now = Instant::now();
        self.ledger.remove(item);
        let remaining = expires_at
            .checked_duration_since(now)
            .filter(|remaining| !remaining.is_zero());

        if let Err(error) = self.retire(item) {
            warn!(%error, "cleanup after report_write failed");
        }
        Ok(remaining)
    }

    /// `true` iff the ledger says live-and-unexpired AND the counting
    /// filter still sees the element. Requiring both keeps the false
    /// positive rate bounded by the underlying filter's.
    pub fn is_cached(&self, item: &[u8]) -> Result<bool> {
        match self.ledger.get(item) {
            Some(&expires_at) if expires_at > Instant::now() => {
                self.filter.contains(item)
            }
            _ => Ok(false),
        }
    }

    /// Remaining TTL for a live, unexpired element; `None` otherwise.
    pub fn remaining_ttl(&self, item: &[u8]) -> Option<Duration> {
        self.ledger
            .get(item)
            .and_then(|expires_at| {
                expires_at.checked_duration_since(Instant::now())
            })
            .filter(|remaining| !remaining.is_zero())
    }

    pub fn remaining_ttls(&self, items: &[&[u8]]) -> Vec<Option<Duration>> {
        items.iter().map(|item| self.remaining_ttl(item)).collect()
    }

    /// Active sweep: retires every expired ledger entry and decrements the
    /// counting filter accordingly. Returns the number of entries reaped.
    pub fn sweep_expired(&mut self) -> Result<usize> {
        let now = Instant::now();
        let expired: Vec<Vec<u8>> = self
            .ledger
            .iter()
            .filter(|&(_, &expires_at)| expires_at <= now)
            .map(|(item, _)| item.clone())
            .collect();

        for item in &expired {
            self.retire(item)?;
            self.ledger.remove(item);
        }
        self.last_sweep = now;
        if !expired.is_empty() {
            debug!(reaped = expired.len(), "expired entries swept");
        }
        Ok(expired.len())
    }

    fn maybe_sweep(&mut self) {
        if self.last_sweep.elapsed() >= self.sweep_interval {
            if let Err(error) = self.sweep_expired() {
                warn!(%error, "background sweep failed");
            }
        }
    }

    /// Decrements the element's counters if the filter still reports it
    /// present.
    fn retire(&mut self, item: &[u8]) -> Result<()> {
        if self.filter.contains(item)? {
            self.filter.remove_and_estimate_count(item)?;
        }
        Ok(())
    }

    /// Structurally independent snapshot of the underlying bit layer. The
    /// ledger is not part of it.
    pub fn cloned_bloom_filter(&self) -> Result<BloomFilter<LocalBitVector>> {
        self.filter.to_plain_snapshot()
    }

    /// Number of elements currently tracked by the ledger, expired entries
    /// included until they are swept.
    pub fn tracked_elements(&self) -> usize {
        self.ledger.len()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ledger.clear();
        self.filter.clear()
    }
}

impl<V: BitVector> std::fmt::Debug for ExpiringBloomFilter<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ExpiringBloomFilter {{ size: {}, hashes: {}, tracked: {}, \
             sweep_interval: {:?} }}",
            self.filter.params().size,
            self.filter.params().hashes,
            self.ledger.len(),
            self.sweep_interval
        )
    }
}
