use crate::config::{CounterWidth, FilterConfig, FilterParams};
use crate::error::{FilterError, Result};
use crate::storage::{BitVector, LocalBitVector, ReadConsistency};

/// Plain Bloom filter over any [`BitVector`] realization.
///
/// False positives are possible, false negatives are not. Removal needs a
/// [`CountingBloomFilter`](crate::CountingBloomFilter).
pub struct BloomFilter<V: BitVector> {
    params: FilterParams,
    bits: V,
}

impl BloomFilter<LocalBitVector> {
    /// Builds a process-local filter. Fails immediately when the
    /// configuration is underspecified.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let mut params = FilterParams::try_from(config)?;
        params.counter_width = CounterWidth::Plain;
        let bits = LocalBitVector::new(params.size, 1)?;
        Ok(Self { params, bits })
    }
}

impl<V: BitVector> BloomFilter<V> {
    /// Wraps an already-prepared width-1 vector.
    pub fn with_vector(params: FilterParams, bits: V) -> Result<Self> {
        if bits.slot_width() != 1 {
            return Err(FilterError::InvalidConfig(format!(
                "Plain filter requires a 1-bit vector, got width {}",
                bits.slot_width()
            )));
        }
        if bits.slot_count() != params.size {
            return Err(FilterError::InvalidConfig(format!(
                "Vector has {} slots but the configuration expects {}",
                bits.slot_count(),
                params.size
            )));
        }
        Ok(Self { params, bits })
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn bit_vector(&self) -> &V {
        &self.bits
    }

    fn positions(&self, item: &[u8]) -> Vec<usize> {
        self.params
            .hash_method
            .positions(item, self.params.hashes, self.params.size)
    }

    /// Adds an element in one bulk write. Returns `true` iff every probed
    /// bit was already set, i.e. the element was indistinguishable from
    /// already-present before this call.
    pub fn add(&mut self, item: &[u8]) -> Result<bool> {
        let positions = self.positions(item);
        let ones = vec![1u64; positions.len()];
        let previous = self.bits.set_many(&positions, &ones)?;
        Ok(previous.iter().all(|&bit| bit == 1))
    }

    /// Adds a batch of elements in a single bulk write covering all their
    /// positions; per-element results carry the same meaning as [`add`].
    ///
    /// [`add`]: BloomFilter::add
    pub fn add_all(&mut self, items: &[&[u8]]) -> Result<Vec<bool>> {
        let positions: Vec<usize> = items
            .iter()
            .flat_map(|item| self.positions(item))
            .collect();
        let ones = vec![1u64; positions.len()];
        let previous = self.bits.set_many(&positions, &ones)?;
        Ok(slice_all_ones(&previous, self.params.hashes))
    }

    /// Membership probe: `true` iff all k probed bits are set.
    pub fn contains(&self, item: &[u8]) -> Result<bool> {
        self.contains_with(item, ReadConsistency::Strong)
    }

    /// Membership probe that opts into possibly-stale replica reads.
    pub fn contains_stale(&self, item: &[u8]) -> Result<bool> {
        self.contains_with(item, ReadConsistency::StaleOk)
    }

    fn contains_with(
        &self,
        item: &[u8],
        consistency: ReadConsistency,
    ) -> Result<bool> {
        let positions = self.positions(item);
        let values = self.bits.get_many(&positions, consistency)?;
        Ok(values.iter().all(|&bit| bit == 1))
    }

    /// Batched membership probe: one bulk read over all elements'
    /// positions, sliced back per element in submission order.
    pub fn contains_all(&self, items: &[&[u8]]) -> Result<Vec<bool>> {
        let positions: Vec<usize> = items
            .iter()
            .flat_map(|item| self.positions(item))
            .collect();
        let values =
            self.bits.get_many(&positions, ReadConsistency::Strong)?;
        Ok(slice_all_ones(&values, self.params.hashes))
    }

    pub fn is_compatible_to<W: BitVector>(
        &self,
        other: &BloomFilter<W>,
    ) -> bool {
        self.params.is_compatible_to(&other.params)
    }

    /// Bitwise-ORs `other` into this filter. The result contains every
    /// element of both inputs.
    pub fn union<W: BitVector>(&mut self, other: &BloomFilter<W>) -> Result<()> {
        self.merge(other, |a, b| a | b)
    }

    /// Bitwise-ANDs `other` into this filter.
    pub fn intersect<W: BitVector>(
        &mut self,
        other: &BloomFilter<W>,
    ) -> Result<()> {
        self.merge(other, |a, b| a & b)
    }

    fn merge<W: BitVector>(
        &mut self,
        other: &BloomFilter<W>,
        combine: fn(u8, u8) -> u8,
    ) -> Result<()> {
        if !self.is_compatible_to(other) {
            return Err(FilterError::IncompatibleConfig {
                reason: format!(
                    "(size {}, hashes {}, method {}) vs \
                     (size {}, hashes {}, method {})",
                    self.params.size,
                    self.params.hashes,
                    self.params.hash_method,
                    other.params.size,
                    other.params.hashes,
                    other.params.hash_method
                ),
            });
        }
        let mine = self.bits.to_bytes()?;
        let theirs = other.bits.to_bytes()?;
        let merged: Vec<u8> = mine
            .iter()
            .zip(theirs.iter())
            .map(|(&a, &b)| combine(a, b))
            .collect();
        self.bits.overwrite_bytes(&merged)
    }

    /// Estimates how many distinct elements have been added:
    /// `-m/k * ln(1 - ones/m)`. Near saturation the estimate degrades
    /// without bound; that is inherent to the formula, not a defect.
    pub fn estimated_population(&self) -> Result<f64> {
        let ones = self.bits.cardinality()? as f64;
        let m = self.params.size as f64;
        let k = self.params.hashes as f64;
        Ok(-m / k * (1.0 - ones / m).ln())
    }

    pub fn cardinality(&self) -> Result<u64> {
        self.bits.cardinality()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.bits.is_empty()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.bits.clear()
    }
}

/// Slices a flat per-position result stream into per-element booleans,
/// `hashes` consecutive entries each, preserving submission order.
fn slice_all_ones(values: &[u64], hashes: usize) -> Vec<bool> {
    values
        .chunks(hashes)
        .map(|chunk| chunk.iter().all(|&bit| bit == 1))
        .collect()
}

impl<V: BitVector> std::fmt::Debug for BloomFilter<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BloomFilter {{ size: {}, hashes: {}, hash_method: {} }}",
            self.params.size, self.params.hashes, self.params.hash_method
        )
    }
}
