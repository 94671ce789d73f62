use derive_builder::Builder;
use std::time::Duration;

use crate::error::{FilterError, Result};
use crate::hash::HashMethod;

/// Width of one addressable slot in the bit vector.
///
/// `Plain` filters spend a single bit per slot; counting filters widen each
/// slot into a saturating unsigned counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterWidth {
    Plain,
    Bits4,
    Bits8,
    Bits16,
    Bits32,
    Bits64,
}

impl CounterWidth {
    pub fn bits(self) -> u8 {
        match self {
            CounterWidth::Plain => 1,
            CounterWidth::Bits4 => 4,
            CounterWidth::Bits8 => 8,
            CounterWidth::Bits16 => 16,
            CounterWidth::Bits32 => 32,
            CounterWidth::Bits64 => 64,
        }
    }

    /// Largest value one counter can hold.
    pub fn max_count(self) -> u64 {
        match self {
            CounterWidth::Bits64 => u64::MAX,
            other => (1u64 << other.bits()) - 1,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(CounterWidth::Plain),
            4 => Some(CounterWidth::Bits4),
            8 => Some(CounterWidth::Bits8),
            16 => Some(CounterWidth::Bits16),
            32 => Some(CounterWidth::Bits32),
            64 => Some(CounterWidth::Bits64),
            _ => None,
        }
    }
}

/// Configuration for all filter variants.
///
/// Either `size`/`hashes` or `expected_elements`/`false_positive_rate` must
/// be supplied; the missing pair is derived with the standard closed-form
/// formulas when the configuration is finalized into [`FilterParams`].
#[derive(Clone, Debug, Builder)]
#[builder(pattern = "owned")]
pub struct FilterConfig {
    /// Expected number of distinct elements (n)
    #[builder(setter(strip_option), default)]
    pub expected_elements: Option<usize>,

    /// Tolerable false positive rate (between 0 and 1)
    #[builder(setter(strip_option), default)]
    pub false_positive_rate: Option<f64>,

    /// Bit vector width in slots (m)
    #[builder(setter(strip_option), default)]
    pub size: Option<usize>,

    /// Number of hash functions (k)
    #[builder(setter(strip_option), default)]
    pub hashes: Option<usize>,

    /// Bits per counter for counting variants
    #[builder(default = "CounterWidth::Bits16")]
    pub counter_width: CounterWidth,

    /// Digest strategy for position generation
    #[builder(default)]
    pub hash_method: HashMethod,

    /// Key namespace for remote-backed filters
    #[builder(setter(into), default)]
    pub name: String,

    /// Overwrite a pre-existing remote filter with the same name instead of
    /// attaching to it
    #[builder(default)]
    pub overwrite_if_exists: bool,

    /// Cadence of the expiring filter's lazy active sweep
    #[builder(default = "Duration::from_secs(60)")]
    pub sweep_interval: Duration,
}

/// Finalized filter parameters, immutable once derived.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterParams {
    pub size: usize,
    pub hashes: usize,
    pub expected_elements: usize,
    pub false_positive_rate: f64,
    pub counter_width: CounterWidth,
    pub hash_method: HashMethod,
}

impl FilterParams {
    /// Two filters are interoperable for union/intersect and may share a
    /// remote bit vector iff their size, hash count and hash method agree.
    pub fn is_compatible_to(&self, other: &FilterParams) -> bool {
        self.size == other.size
            && self.hashes == other.hashes
            && self.hash_method == other.hash_method
    }

    /// Rebuilds params from an explicit size/hash-count pair, deriving the
    /// informational n and p values.
    pub fn from_size_and_hashes(
        size: usize,
        hashes: usize,
        counter_width: CounterWidth,
        hash_method: HashMethod,
    ) -> Result<Self> {
        if size == 0 {
            return Err(FilterError::InvalidConfig(
                "Bit vector size must be greater than 0".into(),
            ));
        }
        if hashes == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of hashes must be greater than 0".into(),
            ));
        }
        let expected_elements = optimal_n(hashes, size);
        Ok(Self {
            size,
            hashes,
            expected_elements,
            false_positive_rate: optimal_p(hashes, size, expected_elements as f64),
            counter_width,
            hash_method,
        })
    }
}

impl TryFrom<&FilterConfig> for FilterParams {
    type Error = FilterError;

    fn try_from(config: &FilterConfig) -> Result<Self> {
        if let Some(p) = config.false_positive_rate {
            if p <= 0.0 || p >= 1.0 {
                return Err(FilterError::InvalidConfig(format!(
                    "False positive rate must be between 0 and 1, got {p}"
                )));
            }
        }
        if config.expected_elements == Some(0) {
            return Err(FilterError::InvalidConfig(
                "Expected elements must be greater than 0".into(),
            ));
        }

        let size = match (config.size, config.expected_elements) {
            (Some(m), _) => m,
            (None, Some(n)) => match config.false_positive_rate {
                Some(p) => optimal_m(n, p),
                None => {
                    return Err(FilterError::InvalidConfig(
                        "Neither (expected_elements, false_positive_rate) \
                         nor (size, hashes) were specified"
                            .into(),
                    ));
                }
            },
            (None, None) => {
                return Err(FilterError::InvalidConfig(
                    "Neither (expected_elements, false_positive_rate) \
                     nor (size, hashes) were specified"
                        .into(),
                ));
            }
        };
        let hashes = match (config.hashes, config.expected_elements) {
            (Some(k), _) => k,
            (None, Some(n)) => optimal_k(n, size),
            (None, None) => {
                return Err(FilterError::InvalidConfig(
                    "Neither (expected_elements, false_positive_rate) \
                     nor (size, hashes) were specified"
                        .into(),
                ));
            }
        };
        if size == 0 {
            return Err(FilterError::InvalidConfig(
                "Bit vector size must be greater than 0".into(),
            ));
        }
        if hashes == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of hashes must be greater than 0".into(),
            ));
        }

        let expected_elements = config
            .expected_elements
            .unwrap_or_else(|| optimal_n(hashes, size));
        let false_positive_rate = config.false_positive_rate.unwrap_or_else(
            || optimal_p(hashes, size, expected_elements as f64),
        );

        Ok(Self {
            size,
            hashes,
            expected_elements,
            false_positive_rate,
            counter_width: config.counter_width,
            hash_method: config.hash_method,
        })
    }
}

/// Optimal bit vector size m for n expected elements at false positive
/// rate p.
pub fn optimal_m(n: usize, p: f64) -> usize {
    let ln2 = std::f64::consts::LN_2;
    ((-(n as f64) * p.ln()) / (ln2 * ln2)).ceil() as usize
}

/// Optimal number of hash functions k for n expected elements in m bits.
pub fn optimal_k(n: usize, m: usize) -> usize {
    ((m as f64 / n as f64) * std::f64::consts::LN_2).ceil() as usize
}

/// Number of elements for which an (k, m) pair is optimal.
pub fn optimal_n(k: usize, m: usize) -> usize {
    ((std::f64::consts::LN_2 * m as f64) / k as f64).ceil() as usize
}

/// Best-case false positive probability after inserting n elements.
pub fn optimal_p(k: usize, m: usize, n: f64) -> f64 {
    (1.0 - (-(k as f64) * n / m as f64).exp()).powi(k as i32)
}
