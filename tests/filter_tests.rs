use rand::Rng;
use shared_bloom_rs::{
    BitVector, BloomFilter, FilterConfigBuilder, FilterError, HashMethod, LocalBitVector,
};

fn create_filter(size: usize, hashes: usize) -> BloomFilter<LocalBitVector> {
    let config = FilterConfigBuilder::default()
        .size(size)
        .hashes(hashes)
        .build()
        .expect("Unable to build FilterConfig");
    BloomFilter::from_config(&config).expect("Failed to create filter")
}

fn random_items(count: usize, len: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| (0..len).map(|_| rng.random()).collect())
        .collect()
}

mod membership_tests {
    use super::*;

    #[test]
    fn test_basic_scenario() {
        let mut filter = create_filter(1000, 7);
        filter.add(b"alpha").unwrap();
        filter.add(b"beta").unwrap();

        assert!(filter.contains(b"alpha").unwrap());
        assert!(filter.contains(b"beta").unwrap());
        // With 2 of ~1000 elements inserted a false positive here is
        // vanishingly unlikely.
        assert!(!filter.contains(b"gamma").unwrap());
    }

    #[test]
    fn test_no_false_negatives() {
        let config = FilterConfigBuilder::default()
            .expected_elements(1000)
            .false_positive_rate(0.01)
            .build()
            .unwrap();
        let mut filter = BloomFilter::from_config(&config).unwrap();

        let items = random_items(1000, 12);
        for item in &items {
            filter.add(item).unwrap();
        }
        for item in &items {
            assert!(filter.contains(item).unwrap());
        }
    }

    #[test]
    fn test_false_positive_rate_within_bounds() {
        const FALSE_POSITIVE_RATE: f64 = 0.05;
        let config = FilterConfigBuilder::default()
            .expected_elements(10_000)
            .false_positive_rate(FALSE_POSITIVE_RATE)
            .build()
            .unwrap();
        let mut filter = BloomFilter::from_config(&config).unwrap();

        for item in random_items(10_000, 10) {
            filter.add(&item).unwrap();
        }

        let probes = random_items(1000, 11);
        let false_positives = probes
            .iter()
            .filter(|item| filter.contains(item).unwrap())
            .count();
        let observed = false_positives as f64 / probes.len() as f64;
        assert!(
            observed <= FALSE_POSITIVE_RATE * 1.5,
            "False positive rate is too high: observed {observed}, \
             expected {FALSE_POSITIVE_RATE}"
        );
    }

    #[test]
    fn test_add_observes_prior_state() {
        let mut filter = create_filter(10_000, 7);
        assert!(!filter.add(b"first").unwrap());
        assert!(filter.add(b"first").unwrap());
        assert!(!filter.add(b"second").unwrap());
    }
}

mod bulk_tests {
    use super::*;

    #[test]
    fn test_bulk_results_keep_submission_order() {
        let mut filter = create_filter(5000, 7);
        let items: Vec<&[u8]> = vec![b"a", b"b", b"c", b"a", b"d"];

        let added = filter.add_all(&items).unwrap();
        // "a" resubmitted within the same batch reads its own bits back
        assert_eq!(added, vec![false, false, false, true, false]);

        let contains = filter
            .contains_all(&[b"c".as_slice(), b"missing", b"a"])
            .unwrap();
        assert_eq!(contains, vec![true, false, true]);
    }

    #[test]
    fn test_bulk_agrees_with_single_ops() {
        let mut bulk = create_filter(5000, 5);
        let mut single = create_filter(5000, 5);
        let items = random_items(100, 8);
        let refs: Vec<&[u8]> = items.iter().map(|v| v.as_slice()).collect();

        bulk.add_all(&refs).unwrap();
        for item in &refs {
            single.add(item).unwrap();
        }

        let probes = random_items(100, 8);
        let probe_refs: Vec<&[u8]> =
            probes.iter().map(|v| v.as_slice()).collect();
        assert_eq!(
            bulk.contains_all(&probe_refs).unwrap(),
            probe_refs
                .iter()
                .map(|item| single.contains(item).unwrap())
                .collect::<Vec<_>>()
        );
    }
}

mod merge_tests {
    use super::*;

    #[test]
    fn test_union_covers_disjoint_sets() {
        let mut a = create_filter(1000, 7);
        let mut b = create_filter(1000, 7);
        for i in 0..20 {
            a.add(format!("left_{i}").as_bytes()).unwrap();
            b.add(format!("right_{i}").as_bytes()).unwrap();
        }

        assert!(a.is_compatible_to(&b));
        a.union(&b).unwrap();
        for i in 0..20 {
            assert!(a.contains(format!("left_{i}").as_bytes()).unwrap());
            assert!(a.contains(format!("right_{i}").as_bytes()).unwrap());
        }
    }

    #[test]
    fn test_intersect_of_equal_filters_is_identity() {
        let mut a = create_filter(1000, 7);
        let mut b = create_filter(1000, 7);
        for i in 0..20 {
            let item = format!("shared_{i}");
            a.add(item.as_bytes()).unwrap();
            b.add(item.as_bytes()).unwrap();
        }

        let before = a.bit_vector().to_bytes().unwrap();
        a.intersect(&b).unwrap();
        assert_eq!(a.bit_vector().to_bytes().unwrap(), before);
    }

    #[test]
    fn test_incompatible_filters_refuse_to_merge() {
        let mut base = create_filter(1000, 7);

        let other_hashes = create_filter(1000, 5);
        assert!(!base.is_compatible_to(&other_hashes));
        assert!(matches!(
            base.union(&other_hashes),
            Err(FilterError::IncompatibleConfig { .. })
        ));

        let other_method_config = FilterConfigBuilder::default()
            .size(1000)
            .hashes(7)
            .hash_method(HashMethod::Murmur3X64Km)
            .build()
            .unwrap();
        let other_method =
            BloomFilter::from_config(&other_method_config).unwrap();
        assert!(matches!(
            base.intersect(&other_method),
            Err(FilterError::IncompatibleConfig { .. })
        ));
    }
}

mod estimate_tests {
    use super::*;

    #[test]
    fn test_population_estimate_tracks_inserts() {
        let mut filter = create_filter(100_000, 7);
        assert_eq!(filter.estimated_population().unwrap(), 0.0);

        for item in random_items(1000, 10) {
            filter.add(&item).unwrap();
        }
        let estimate = filter.estimated_population().unwrap();
        assert!(
            (estimate - 1000.0).abs() < 50.0,
            "estimate {estimate} too far from 1000"
        );
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_underspecified_config_fails_at_construction() {
        let config = FilterConfigBuilder::default().build().unwrap();
        assert!(matches!(
            BloomFilter::from_config(&config),
            Err(FilterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_size_rejected() {
        let config = FilterConfigBuilder::default()
            .size(0)
            .hashes(7)
            .build()
            .unwrap();
        assert!(BloomFilter::from_config(&config).is_err());
    }
}
