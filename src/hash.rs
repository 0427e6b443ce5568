use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A fixed-length binary fingerprint stored as packed bits.
///
/// Bits are packed most-significant-first: bit `0` is the high bit of the first byte.
/// Any padding bits in the final byte are always zero, so two hashes of the same
/// length can be compared byte by byte.
///
/// The hex form follows the usual image hash convention: the bit string is read as a
/// single big-endian integer and printed with `ceil(len / 4)` hex digits. For lengths
/// that are a multiple of 8 (e.g. the default 144-bit perceptual hash) this is simply
/// the hex encoding of the packed bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitHash {
    bytes: Vec<u8>,
    len: usize,
}

impl BitHash {
    /// Packs a sequence of bits into a hash.
    pub fn from_bits<I>(bits: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut bytes = Vec::new();
        let mut len = 0;
        for bit in bits {
            if len % 8 == 0 {
                bytes.push(0);
            }
            if bit {
                bytes[len / 8] |= 0x80 >> (len % 8);
            }
            len += 1;
        }
        Self { bytes, len }
    }

    /// Builds a hash from packed bytes, using all `8 * bytes.len()` bits.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() * 8;
        Self { bytes, len }
    }

    /// Parses a hex string into a hash of `len` bits.
    ///
    /// The string must have exactly `ceil(len / 4)` digits, and any leading bits beyond
    /// `len` must be zero.
    pub fn from_hex_with_len(hex: &str, len: usize) -> Result<Self> {
        let invalid = || Error::InvalidHash(hex.to_owned());

        if len == 0 || hex.len() != (len + 3) / 4 {
            return Err(invalid());
        }

        let pad = hex.len() * 4 - len;
        let mut bits = Vec::with_capacity(hex.len() * 4);
        for c in hex.chars() {
            let nibble = c.to_digit(16).ok_or_else(invalid)?;
            bits.extend((0..4).rev().map(|shift| nibble & (1 << shift) != 0));
        }
        if bits[..pad].iter().any(|b| *b) {
            return Err(invalid());
        }

        Ok(Self::from_bits(bits.into_iter().skip(pad)))
    }

    /// Number of bits in this hash.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Packed representation of this hash.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the bit at position `i`.
    pub fn bit(&self, i: usize) -> Option<bool> {
        (i < self.len).then(|| self.bytes[i / 8] & (0x80 >> (i % 8)) != 0)
    }

    /// Iterates over all bits in order.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.bytes[i / 8] & (0x80 >> (i % 8)) != 0)
    }

    /// Counts the bit positions in which the two hashes differ.
    pub fn hamming(&self, other: &BitHash) -> Result<u32> {
        if self.len != other.len {
            return Err(Error::HashLengthMismatch {
                left: self.len,
                right: other.len,
            });
        }
        Ok(self
            .bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| u32::count_ones(a ^ b))
            .sum())
    }

    /// Returns the hex form of this hash.
    pub fn to_hex(&self) -> String {
        let digits = (self.len + 3) / 4;
        let pad = digits * 4 - self.len;
        let bits: Vec<bool> = std::iter::repeat(false)
            .take(pad)
            .chain(self.bits())
            .collect();

        bits.chunks(4)
            .map(|nibble| {
                let value = nibble
                    .iter()
                    .fold(0u32, |acc, bit| (acc << 1) | u32::from(*bit));
                std::char::from_digit(value, 16).unwrap_or('0')
            })
            .collect()
    }
}

impl fmt::Display for BitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for BitHash {
    type Err = Error;

    /// Parses a hex string, assuming every digit carries four bits.
    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex_with_len(s, s.len() * 4)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_packing_is_msb_first() {
        let hash = BitHash::from_bits([true, false, false, false, false, false, false, true, true]);
        assert_eq!(hash.len(), 9);
        assert_eq!(hash.as_bytes(), &[0x81, 0x80]);
        assert_eq!(hash.bit(8), Some(true));
        assert_eq!(hash.bit(9), None);
    }

    #[test]
    fn test_hex_of_byte_aligned_hash() {
        let hash = BitHash::from_bytes(vec![0xF0; 18]);
        assert_eq!(hash.len(), 144);
        assert_eq!(hash.to_hex(), "f0".repeat(18));
        assert_eq!(hash.to_hex().parse::<BitHash>().unwrap(), hash);
    }

    #[test]
    fn test_hex_pads_leading_bits() {
        // 0b101 is printed as a single digit.
        let hash = BitHash::from_bits([true, false, true]);
        assert_eq!(hash.to_hex(), "5");
        assert_eq!(BitHash::from_hex_with_len("5", 3).unwrap(), hash);

        // 0b1_0000 needs two digits with a zero-padded high nibble.
        let hash = BitHash::from_bits([true, false, false, false, false]);
        assert_eq!(hash.to_hex(), "10");
    }

    #[test]
    fn test_invalid_hex_is_rejected() {
        assert!(matches!(
            "xyz0".parse::<BitHash>(),
            Err(Error::InvalidHash(_))
        ));
        // Wrong digit count for the requested length.
        assert!(BitHash::from_hex_with_len("ff", 4).is_err());
        // Padding bits set.
        assert!(BitHash::from_hex_with_len("f", 3).is_err());
        assert!("".parse::<BitHash>().is_err());
    }

    #[test]
    fn test_hamming_rejects_mismatched_lengths() {
        let a = BitHash::from_bytes(vec![0u8; 18]);
        let b = BitHash::from_bytes(vec![0u8; 8]);
        assert!(matches!(
            a.hamming(&b),
            Err(Error::HashLengthMismatch {
                left: 144,
                right: 64,
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_hamming_counts_flipped_bits(
            bits in proptest::collection::vec(any::<bool>(), 1..300),
            flips in proptest::collection::vec(any::<prop::sample::Index>(), 0..50),
        ) {
            let mut flipped = bits.clone();
            for idx in &flips {
                let i = idx.index(flipped.len());
                flipped[i] = !flipped[i];
            }
            let expected = bits.iter().zip(flipped.iter()).filter(|(a, b)| a != b).count() as u32;

            let a = BitHash::from_bits(bits.iter().copied());
            let b = BitHash::from_bits(flipped.iter().copied());
            prop_assert_eq!(a.hamming(&b).unwrap(), expected);
            prop_assert_eq!(b.hamming(&a).unwrap(), expected);
        }

        #[test]
        fn prop_hex_preserves_bits(bits in proptest::collection::vec(any::<bool>(), 1..200)) {
            let hash = BitHash::from_bits(bits.iter().copied());
            let parsed = BitHash::from_hex_with_len(&hash.to_hex(), bits.len()).unwrap();
            prop_assert_eq!(parsed.bits().collect::<Vec<_>>(), bits);
        }
    }
}
