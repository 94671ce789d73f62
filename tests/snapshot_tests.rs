use shared_bloom_rs::{
    BloomFilter, FilterConfigBuilder, HashMethod, snapshot,
};

#[test]
fn test_round_trip_preserves_contains_results() {
    let config = FilterConfigBuilder::default()
        .size(1000)
        .hashes(7)
        .build()
        .unwrap();
    let mut original = BloomFilter::from_config(&config).unwrap();
    for i in 0..50 {
        original.add(format!("entry_{i}").as_bytes()).unwrap();
    }

    let json = snapshot::to_json(&original).unwrap();
    let decoded = snapshot::from_json(&json, HashMethod::Murmur3Km).unwrap();

    for i in 0..100 {
        let probe = format!("entry_{i}");
        assert_eq!(
            decoded.contains(probe.as_bytes()).unwrap(),
            original.contains(probe.as_bytes()).unwrap(),
            "membership diverged for {probe}"
        );
    }
}

#[test]
fn test_snapshot_travels_as_plain_json_text() {
    let config = FilterConfigBuilder::default()
        .size(500)
        .hashes(5)
        .build()
        .unwrap();
    let mut filter = BloomFilter::from_config(&config).unwrap();
    filter.add(b"payload").unwrap();

    // Simulate interchange: serialize to a string, parse it back elsewhere
    let wire = snapshot::to_json(&filter).unwrap().to_string();
    let parsed: serde_json::Value = serde_json::from_str(&wire).unwrap();
    let decoded =
        snapshot::from_json(&parsed, HashMethod::Murmur3Km).unwrap();

    assert_eq!(decoded.params().size, 500);
    assert_eq!(decoded.params().hashes, 5);
    assert!(decoded.contains(b"payload").unwrap());
}

#[test]
fn test_decoding_with_agreed_hash_method() {
    let config = FilterConfigBuilder::default()
        .size(1000)
        .hashes(7)
        .hash_method(HashMethod::Murmur3X64Km)
        .build()
        .unwrap();
    let mut original = BloomFilter::from_config(&config).unwrap();
    original.add(b"keyed").unwrap();

    let json = snapshot::to_json(&original).unwrap();
    // The format does not embed the hash method; the decoder must be told
    // the one agreed out-of-band.
    let decoded =
        snapshot::from_json(&json, HashMethod::Murmur3X64Km).unwrap();
    assert!(decoded.contains(b"keyed").unwrap());
}
