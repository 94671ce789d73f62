use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::config::{CounterWidth, FilterParams};
use crate::error::{FilterError, Result};
use crate::filter::BloomFilter;
use crate::hash::HashMethod;
use crate::storage::{BitVector, LocalBitVector};

/// Minimal interchange snapshot of a plain filter: bit count, hash count
/// and the Base64-encoded bit payload (MSB-first per byte). The hash
/// method is deliberately not embedded; producer and consumer agree on it
/// out-of-band.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    m: usize,
    k: usize,
    b: String,
}

/// Serializes a filter into the snapshot object. Works for any backend:
/// a remote-backed filter is snapshotted through one full-vector fetch.
pub fn to_json<V: BitVector>(
    filter: &BloomFilter<V>,
) -> Result<serde_json::Value> {
    let snapshot = Snapshot {
        m: filter.params().size,
        k: filter.params().hashes,
        b: to_base64(filter)?,
    };
    serde_json::to_value(&snapshot)
        .map_err(|e| FilterError::SerializationError(e.to_string()))
}

/// Base64 payload of the filter's bit vector alone.
pub fn to_base64<V: BitVector>(filter: &BloomFilter<V>) -> Result<String> {
    Ok(BASE64.encode(filter.bit_vector().to_bytes()?))
}

/// Rebuilds a local filter from a snapshot object, restoring the bit
/// vector verbatim. `hash_method` must be the one the producer used.
pub fn from_json(
    value: &serde_json::Value,
    hash_method: HashMethod,
) -> Result<BloomFilter<LocalBitVector>> {
    let snapshot: Snapshot = serde_json::from_value(value.clone())
        .map_err(|e| FilterError::SerializationError(e.to_string()))?;
    let payload = BASE64
        .decode(&snapshot.b)
        .map_err(|e| FilterError::SerializationError(e.to_string()))?;

    let params = FilterParams::from_size_and_hashes(
        snapshot.m,
        snapshot.k,
        CounterWidth::Plain,
        hash_method,
    )?;
    let mut bits = LocalBitVector::new(snapshot.m, 1)?;
    bits.overwrite_bytes(&payload)?;
    BloomFilter::with_vector(params, bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfigBuilder;

    fn sample_filter() -> BloomFilter<LocalBitVector> {
        let config = FilterConfigBuilder::default()
            .size(1000)
            .hashes(7)
            .build()
            .unwrap();
        let mut filter = BloomFilter::from_config(&config).unwrap();
        for item in [&b"alpha"[..], b"beta", b"gamma"] {
            filter.add(item).unwrap();
        }
        filter
    }

    #[test]
    fn test_round_trip_preserves_membership() {
        let original = sample_filter();
        let json = to_json(&original).unwrap();
        let decoded = from_json(&json, HashMethod::Murmur3Km).unwrap();

        assert_eq!(decoded.params().size, 1000);
        assert_eq!(decoded.params().hashes, 7);
        for probe in
            [&b"alpha"[..], b"beta", b"gamma", b"delta", b"epsilon"]
        {
            assert_eq!(
                decoded.contains(probe).unwrap(),
                original.contains(probe).unwrap(),
                "membership diverged for {probe:?}"
            );
        }
        assert_eq!(
            decoded.bit_vector().to_bytes().unwrap(),
            original.bit_vector().to_bytes().unwrap()
        );
    }

    #[test]
    fn test_snapshot_shape() {
        let json = to_json(&sample_filter()).unwrap();
        assert_eq!(json["m"], 1000);
        assert_eq!(json["k"], 7);
        assert!(json["b"].is_string());
    }

    #[test]
    fn test_empty_filter_round_trip() {
        let config = FilterConfigBuilder::default()
            .size(64)
            .hashes(3)
            .build()
            .unwrap();
        let filter = BloomFilter::from_config(&config).unwrap();
        let decoded =
            from_json(&to_json(&filter).unwrap(), HashMethod::Murmur3Km)
                .unwrap();
        assert!(decoded.is_empty().unwrap());
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let bad = serde_json::json!({ "m": 100, "k": 3, "b": "@@not-base64@@" });
        assert!(matches!(
            from_json(&bad, HashMethod::Murmur3Km),
            Err(FilterError::SerializationError(_))
        ));

        let missing = serde_json::json!({ "m": 100 });
        assert!(from_json(&missing, HashMethod::Murmur3Km).is_err());
    }
}
