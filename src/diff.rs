//! Perceptual difference between consecutive frames.
//!
//! Differences are normalized Hamming distances between consecutive fixed-length hashes.
//! Any [BitHash] works as input; nothing here depends on how the hashes were produced.

use crate::hash::BitHash;
use crate::{Error, Result};

/// Returns the Hamming distance between `a` and `b`, divided by the hash length.
///
/// The result lies in `[0, 1]`. The smallest non-zero value is `1 / len`.
pub fn normalized_distance(a: &BitHash, b: &BitHash) -> Result<f64> {
    let distance = a.hamming(b)?;
    if a.is_empty() {
        return Err(Error::InvalidParameter(
            "cannot compare zero-length hashes".to_owned(),
        ));
    }
    Ok(f64::from(distance) / a.len() as f64)
}

// Ensures every hash has the same length as the first one.
fn check_lengths(hashes: &[BitHash]) -> Result<()> {
    let expected = match hashes.first() {
        Some(h) => h.len(),
        None => return Ok(()),
    };
    match hashes.iter().position(|h| h.len() != expected) {
        Some(index) => Err(Error::LengthMismatch {
            index,
            expected,
            found: hashes[index].len(),
        }),
        None => Ok(()),
    }
}

/// Computes the distance of each hash to its predecessor.
///
/// For `N` hashes the result has `N - 1` entries. Hashes must be in timestamp order;
/// the series is meaningless for a reordered or incomplete sequence.
pub fn diff_series(hashes: &[BitHash]) -> Result<Vec<f64>> {
    if hashes.len() < 2 {
        return Err(Error::EmptySequence);
    }
    check_lengths(hashes)?;

    hashes
        .windows(2)
        .map(|pair| normalized_distance(&pair[0], &pair[1]))
        .collect()
}

/// Like [diff_series], but aligned to one value per input hash.
///
/// The first frame has no predecessor, so its distance is defined as `0.0`. A single
/// hash therefore yields `[0.0]`; an empty input is an error.
pub fn aligned_series(hashes: &[BitHash]) -> Result<Vec<f64>> {
    match hashes.len() {
        0 => Err(Error::EmptySequence),
        1 => Ok(vec![0.0]),
        _ => {
            let mut series = Vec::with_capacity(hashes.len());
            series.push(0.0);
            series.extend(diff_series(hashes)?);
            Ok(series)
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn hash_of(byte: u8) -> BitHash {
        BitHash::from_bytes(vec![byte; 18])
    }

    #[test]
    fn test_complementary_hashes_are_maximally_distant() {
        let series = diff_series(&[hash_of(0xF0), hash_of(0x0F)]).unwrap();
        assert_eq!(series, vec![1.0]);
    }

    #[test]
    fn test_identical_hashes_have_zero_distance() {
        let series = diff_series(&[hash_of(0xA5), hash_of(0xA5)]).unwrap();
        assert_eq!(series, vec![0.0]);
    }

    #[test]
    fn test_single_bit_difference() {
        let mut bytes = vec![0u8; 18];
        let a = BitHash::from_bytes(bytes.clone());
        bytes[17] = 1;
        let b = BitHash::from_bytes(bytes);
        assert_eq!(normalized_distance(&a, &b).unwrap(), 1.0 / 144.0);
    }

    #[test]
    fn test_series_length() {
        let hashes = vec![hash_of(0), hash_of(1), hash_of(3), hash_of(3)];
        let series = diff_series(&hashes).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series[0], 18.0 / 144.0);
        assert_eq!(series[1], 18.0 / 144.0);
        assert_eq!(series[2], 0.0);

        let aligned = aligned_series(&hashes).unwrap();
        assert_eq!(aligned.len(), 4);
        assert_eq!(aligned[0], 0.0);
        assert_eq!(&aligned[1..], &series[..]);
    }

    #[test]
    fn test_short_sequences() {
        assert!(matches!(diff_series(&[]), Err(Error::EmptySequence)));
        assert!(matches!(
            diff_series(&[hash_of(0)]),
            Err(Error::EmptySequence)
        ));
        assert!(matches!(aligned_series(&[]), Err(Error::EmptySequence)));
        assert_eq!(aligned_series(&[hash_of(0)]).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_mismatched_lengths_are_reported_with_index() {
        let hashes = vec![hash_of(0), hash_of(0), BitHash::from_bytes(vec![0u8; 8])];
        assert!(matches!(
            diff_series(&hashes),
            Err(Error::LengthMismatch {
                index: 2,
                expected: 144,
                found: 64,
            })
        ));
    }

    #[test]
    fn test_pairwise_mismatch_names_both_lengths() {
        let a = BitHash::from_bits([true, false, true]);
        assert!(matches!(
            normalized_distance(&a, &hash_of(0)),
            Err(Error::HashLengthMismatch { left: 3, right: 144 })
        ));
    }

    #[test]
    fn test_works_with_any_fingerprint_length() {
        let a = BitHash::from_bits([true, true, false]);
        let b = BitHash::from_bits([false, true, true]);
        let series = aligned_series(&[a, b]).unwrap();
        assert_eq!(series, vec![0.0, 2.0 / 3.0]);
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric_and_bounded(
            a in proptest::collection::vec(any::<u8>(), 18),
            b in proptest::collection::vec(any::<u8>(), 18),
        ) {
            let (a, b) = (BitHash::from_bytes(a), BitHash::from_bytes(b));
            let ab = normalized_distance(&a, &b).unwrap();
            let ba = normalized_distance(&b, &a).unwrap();
            prop_assert_eq!(ab, ba);
            prop_assert!((0.0..=1.0).contains(&ab));
        }
    }
}
