use std::collections::HashMap;

use crate::config::{CounterWidth, FilterConfig, FilterParams};
use crate::error::{FilterError, Result};
use crate::filter::BloomFilter;
use crate::storage::{BitVector, LocalBitVector, ReadConsistency};

/// Counting Bloom filter: every slot is a saturating unsigned counter of
/// `counter_width` bits, which makes removal possible.
///
/// Occurrence counts are estimated with the spectral minimum: the smallest
/// of an element's k counters. Colliding elements can only inflate a
/// counter, never deflate it, so the minimum tracks the true count tightly
/// from above. Removing an element that was never added can push shared
/// counters below their true value; that hazard is inherent to the
/// structure.
pub struct CountingBloomFilter<V: BitVector> {
    params: FilterParams,
    counters: V,
}

impl CountingBloomFilter<LocalBitVector> {
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let params = FilterParams::try_from(config)?;
        let counters =
            LocalBitVector::new(params.size, params.counter_width.bits())?;
        Self::with_vector(params, counters)
    }
}

impl<V: BitVector> CountingBloomFilter<V> {
    pub fn with_vector(params: FilterParams, counters: V) -> Result<Self> {
        if params.counter_width == CounterWidth::Plain {
            return Err(FilterError::InvalidConfig(
                "Counting filter requires a counter width of at least 4 bits"
                    .into(),
            ));
        }
        if counters.slot_width() != params.counter_width.bits() {
            return Err(FilterError::InvalidConfig(format!(
                "Vector slot width {} does not match counter width {}",
                counters.slot_width(),
                params.counter_width.bits()
            )));
        }
        if counters.slot_count() != params.size {
            return Err(FilterError::InvalidConfig(format!(
                "Vector has {} slots but the configuration expects {}",
                counters.slot_count(),
                params.size
            )));
        }
        Ok(Self { params, counters })
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn counting_bits(&self) -> u8 {
        self.params.counter_width.bits()
    }

    fn positions(&self, item: &[u8]) -> Vec<usize> {
        self.params
            .hash_method
            .positions(item, self.params.hashes, self.params.size)
    }

    /// Increments the element's counters (saturating at the counter
    /// maximum) and returns the spectral estimate of its occurrence count
    /// after the increment.
    ///
    /// One bulk read plus one bulk write; across processes sharing a
    /// remote vector the two are not atomic together, which is acceptable
    /// for an approximate structure.
    pub fn add_and_estimate_count(&mut self, item: &[u8]) -> Result<u64> {
        self.adjust(item, Adjust::Increment)
    }

    /// Adds an element; `true` iff the estimate says this is its first
    /// occurrence in the filter.
    pub fn add(&mut self, item: &[u8]) -> Result<bool> {
        Ok(self.add_and_estimate_count(item)? == 1)
    }

    /// Decrements the element's counters (flooring at zero) and returns
    /// the remaining estimated count.
    pub fn remove_and_estimate_count(&mut self, item: &[u8]) -> Result<u64> {
        self.adjust(item, Adjust::Decrement)
    }

    /// Removes one occurrence; `true` iff the element's bits are all zero
    /// afterwards.
    pub fn remove(&mut self, item: &[u8]) -> Result<bool> {
        Ok(self.remove_and_estimate_count(item)? == 0)
    }

    /// Spectral estimate without mutating the filter.
    pub fn estimated_count(&self, item: &[u8]) -> Result<u64> {
        let positions = self.positions(item);
        let values =
            self.counters.get_many(&positions, ReadConsistency::Strong)?;
        Ok(values.into_iter().min().unwrap_or(0))
    }

    pub fn contains(&self, item: &[u8]) -> Result<bool> {
        Ok(self.estimated_count(item)? > 0)
    }

    fn adjust(&mut self, item: &[u8], direction: Adjust) -> Result<u64> {
        let positions = self.positions(item);
        let current = self
            .counters
            .get_many(&positions, ReadConsistency::Strong)?;
        let max = self.params.counter_width.max_count();

        // Duplicate positions are adjusted once per occurrence, so the
        // saturation accounting matches k independent probes.
        let mut pending: HashMap<usize, u64> =
            positions.iter().copied().zip(current).collect();
        for &position in &positions {
            let value = pending[&position];
            let adjusted = match direction {
                Adjust::Increment => {
                    if value < max {
                        value + 1
                    } else {
                        value
                    }
                }
                Adjust::Decrement => value.saturating_sub(1),
            };
            pending.insert(position, adjusted);
        }

        let unique: Vec<usize> = {
            let mut seen = Vec::with_capacity(positions.len());
            for &position in &positions {
                if !seen.contains(&position) {
                    seen.push(position);
                }
            }
            seen
        };
        let values: Vec<u64> =
            unique.iter().map(|position| pending[position]).collect();
        self.counters.set_many(&unique, &values)?;

        Ok(positions
            .iter()
            .map(|position| pending[position])
            .min()
            .unwrap_or(0))
    }

    /// Collapses every non-zero counter into a set bit, producing a
    /// structurally independent local plain filter with the same layout.
    pub fn to_plain_snapshot(&self) -> Result<BloomFilter<LocalBitVector>> {
        let mut plain_params = self.params.clone();
        plain_params.counter_width = CounterWidth::Plain;

        let mut bits = LocalBitVector::new(self.params.size, 1)?;
        let snapshot = self.counters.to_bytes()?;
        let mirror = snapshot_vector(
            &snapshot,
            self.params.size,
            self.params.counter_width.bits(),
        );
        for position in mirror {
            bits.set(position, 1)?;
        }
        BloomFilter::with_vector(plain_params, bits)
    }

    pub fn cardinality(&self) -> Result<u64> {
        self.counters.cardinality()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.counters.is_empty()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.counters.clear()
    }
}

enum Adjust {
    Increment,
    Decrement,
}

/// Positions of non-zero slots in a raw MSB-first snapshot.
fn snapshot_vector(bytes: &[u8], slots: usize, width: u8) -> Vec<usize> {
    let width = width as usize;
    let read_bit = |bit: usize| -> u64 {
        bytes
            .get(bit / 8)
            .map(|&b| ((b >> (7 - (bit % 8))) & 1) as u64)
            .unwrap_or(0)
    };
    (0..slots)
        .filter(|&slot| (0..width).any(|j| read_bit(slot * width + j) != 0))
        .collect()
}

impl<V: BitVector> std::fmt::Debug for CountingBloomFilter<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CountingBloomFilter {{ size: {}, hashes: {}, counter_bits: {}, \
             hash_method: {} }}",
            self.params.size,
            self.params.hashes,
            self.params.counter_width.bits(),
            self.params.hash_method
        )
    }
}
