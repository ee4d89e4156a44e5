//! Similarity-preserving digests over raw byte streams.
//!
//! The digest is a fixed-width summary built from a sliding-window rolling
//! statistic: every window position selects histogram buckets through a
//! salted Pearson chain, the bucket counters are quantized to 2 bits against
//! their own quartile boundaries, and a small header captures gross stream
//! properties (log-scale length, quartile ratios, a rolling checksum). Two
//! digests can then be compared with [`distance`](crate::digest::distance)
//! to obtain a bounded dissimilarity score.
//!
//! The computation is pure and stateless: no I/O, no shared mutable state,
//! safe to invoke concurrently. Recomputing over identical bytes always
//! yields a bit-identical digest.

pub mod distance;
pub mod tables;

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, ScathaError};
use tables::{bucket_mapping, length_bucket};

pub use distance::distance;

/// Sliding window width in bytes.
pub const WINDOW_SIZE: usize = 5;

/// Number of histogram buckets carried into the digest body. The
/// accumulation array is 256 wide; only the first 128 feed the body.
pub const NUM_BUCKETS: usize = 128;

/// Inputs shorter than this cannot produce a stable digest.
pub const MIN_DIGEST_LEN: usize = 50;

/// Body length in bytes: four 2-bit bucket codes per byte.
pub const BODY_LEN: usize = NUM_BUCKETS / 4;

/// Header length in bytes: checksum, length bucket, Q1 ratio, Q2 ratio.
pub const HEADER_LEN: usize = 4;

/// Total digest length in bytes.
pub const DIGEST_LEN: usize = HEADER_LEN + BODY_LEN;

/// A fixed-width similarity digest.
///
/// Layout: `[checksum, length_bucket, q1_ratio, q2_ratio, body[0..32]]`,
/// hex-encoded for display and persistence.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest {
    bytes: [u8; DIGEST_LEN],
}

impl Digest {
    /// Rolling checksum byte, computed over the raw stream independently of
    /// the bucket histogram.
    #[inline]
    pub fn checksum(&self) -> u8 {
        self.bytes[0]
    }

    /// Logarithmic length bucket.
    #[inline]
    pub fn length_bucket(&self) -> u8 {
        self.bytes[1]
    }

    /// Q1/Q3 ratio, reduced mod 16.
    #[inline]
    pub fn q1_ratio(&self) -> u8 {
        self.bytes[2]
    }

    /// Q2/Q3 ratio, reduced mod 16.
    #[inline]
    pub fn q2_ratio(&self) -> u8 {
        self.bytes[3]
    }

    /// Quantized bucket codes, four per byte.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    /// Raw digest bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.bytes
    }

    /// Construct from raw bytes. Intended for decoding persisted digests.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self { bytes }
    }

    /// Fixed-width hex encoding (72 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Decode a hex-encoded digest, rejecting anything that is not exactly
    /// the fixed digest width.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim()).map_err(|e| ScathaError::InvalidDigest(e.to_string()))?;
        let bytes: [u8; DIGEST_LEN] = raw.try_into().map_err(|v: Vec<u8>| {
            ScathaError::InvalidDigest(format!("expected {} bytes, got {}", DIGEST_LEN, v.len()))
        })?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = ScathaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Compute the similarity digest of a byte stream.
///
/// Rejects inputs shorter than [`MIN_DIGEST_LEN`] with
/// [`ScathaError::Undigestible`]. The content itself is never rejected:
/// binary, compressed, non-ASCII and adversarially repetitive streams all
/// digest normally.
pub fn digest(data: &[u8]) -> Result<Digest> {
    if data.len() < MIN_DIGEST_LEN {
        return Err(ScathaError::Undigestible {
            length: data.len(),
            minimum: MIN_DIGEST_LEN,
        });
    }

    // 256-wide accumulator; counters are u64 so pathological streams that
    // funnel every window into one bucket cannot overflow.
    let mut buckets = [0u64; 256];
    let mut checksum: u8 = 0;

    for i in (WINDOW_SIZE - 1)..data.len() {
        let w0 = data[i];
        let w1 = data[i - 1];
        let w2 = data[i - 2];
        let w3 = data[i - 3];
        let w4 = data[i - 4];

        checksum = bucket_mapping(0, w0, w1, checksum);

        buckets[bucket_mapping(2, w0, w1, w2) as usize] += 1;
        buckets[bucket_mapping(3, w0, w1, w3) as usize] += 1;
        buckets[bucket_mapping(5, w0, w2, w3) as usize] += 1;
        buckets[bucket_mapping(7, w0, w2, w4) as usize] += 1;
        buckets[bucket_mapping(11, w0, w1, w4) as usize] += 1;
        buckets[bucket_mapping(13, w0, w3, w4) as usize] += 1;
    }

    let (q1, q2, q3) = quartiles(&buckets[..NUM_BUCKETS]);

    let mut bytes = [0u8; DIGEST_LEN];
    bytes[0] = checksum;
    bytes[1] = length_bucket(data.len() as u64);
    // Repetitive streams can leave three quarters of the buckets empty; the
    // ratios degrade to 0 rather than rejecting the input.
    if q3 > 0 {
        bytes[2] = ((q1 * 100 / q3) % 16) as u8;
        bytes[3] = ((q2 * 100 / q3) % 16) as u8;
    }

    for (i, &count) in buckets[..NUM_BUCKETS].iter().enumerate() {
        let code: u8 = if count <= q1 {
            0
        } else if count <= q2 {
            1
        } else if count <= q3 {
            2
        } else {
            3
        };
        bytes[HEADER_LEN + i / 4] |= code << (2 * (i % 4));
    }

    Ok(Digest { bytes })
}

/// Quartile boundaries over the bucket-counter distribution.
fn quartiles(counts: &[u64]) -> (u64, u64, u64) {
    let mut sorted = counts.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    (sorted[n / 4 - 1], sorted[n / 2 - 1], sorted[3 * n / 4 - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        // Deterministic pseudo-random bytes, xorshift-style
        let mut state = 0x2545_f491_4f6c_dd1du64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state & 0xFF) as u8
            })
            .collect()
    }

    #[test]
    fn test_determinism() {
        let data = sample(4096);
        assert_eq!(digest(&data).unwrap(), digest(&data).unwrap());
    }

    #[test]
    fn test_minimum_length_boundary() {
        let data = sample(MIN_DIGEST_LEN);
        assert!(digest(&data[..MIN_DIGEST_LEN - 1]).is_err());
        assert!(matches!(
            digest(&data[..MIN_DIGEST_LEN - 1]),
            Err(ScathaError::Undigestible {
                length: 49,
                minimum: MIN_DIGEST_LEN
            })
        ));
        assert!(digest(&data).is_ok());
    }

    #[test]
    fn test_empty_input_is_undigestible() {
        assert!(digest(b"").is_err());
    }

    #[test]
    fn test_repetitive_stream_digests() {
        // All-zero input concentrates every window into few buckets; this is
        // expected, not an error.
        let zeros = vec![0u8; 1024];
        let d = digest(&zeros).unwrap();
        assert_eq!(d.q1_ratio(), 0);
        assert_eq!(d.q2_ratio(), 0);
        assert_eq!(distance(&d, &d), 0);
    }

    #[test]
    fn test_binary_and_text_both_digest() {
        let text = b"#!/bin/sh\necho hello world, this is a plain script payload\n";
        let mut binary = sample(2048);
        binary[0] = 0x7f;
        assert!(digest(text).is_ok());
        assert!(digest(&binary).is_ok());
    }

    #[test]
    fn test_digest_depends_only_on_bytes() {
        // Identical content under different names produces identical digests.
        let data = sample(1000);
        let copy = data.clone();
        assert_eq!(digest(&data).unwrap(), digest(&copy).unwrap());
    }

    #[test]
    fn test_hex_round_trip() {
        let d = digest(&sample(777)).unwrap();
        let hex = d.to_hex();
        assert_eq!(hex.len(), DIGEST_LEN * 2);
        assert_eq!(Digest::from_hex(&hex).unwrap(), d);
        assert_eq!(hex.parse::<Digest>().unwrap(), d);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(Digest::from_hex("zz").is_err());
        assert!(Digest::from_hex("abcd").is_err());
        let long = "00".repeat(DIGEST_LEN + 1);
        assert!(Digest::from_hex(&long).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let d = digest(&sample(512)).unwrap();
        let json = serde_json::to_string(&d).unwrap();
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_quartiles_ordering() {
        let counts: Vec<u64> = (0..128).collect();
        let (q1, q2, q3) = quartiles(&counts);
        assert!(q1 <= q2 && q2 <= q3);
        assert_eq!((q1, q2, q3), (31, 63, 95));
    }
}
