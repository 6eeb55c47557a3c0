//! Random Distributed Scalar Encoder (RDSE) implementation.
//!
//! The RDSE maps a numeric value to a bucket `floor(value / resolution)` and
//! hashes the bucket into a fixed number of active bits. It does not need to
//! know the input range up front and keeps no table of past buckets.

use crate::encoders::Encoder;
use crate::error::{HtmError, Result};
use crate::types::{ElemSparse, Sdr, UInt};
use crate::utils::Random;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for creating an RDSE.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct RdseParams {
    /// Total number of bits in the encoded output SDR.
    pub size: UInt,

    /// Fraction of bits in the encoded output which this encoder will activate.
    pub sparsity: f64,

    /// Width of one bucket. Values less than a resolution apart may share a bucket.
    pub resolution: f64,

    /// Forces different encoders to produce different outputs for the same input.
    pub seed: u64,
}

impl Default for RdseParams {
    fn default() -> Self {
        Self {
            size: 4000,
            sparsity: 0.10,
            resolution: 0.001,
            seed: 0,
        }
    }
}

/// Random Distributed Scalar Encoder.
///
/// Every bucket draws its active bits as a fresh random sample of
/// `round(size * sparsity)` distinct positions, keyed by a MurmurHash3 mix of
/// the seed and the bucket index. Neighboring buckets therefore share only
/// chance overlap.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::encoders::{Encoder, RandomDistributedScalarEncoder, RdseParams};
///
/// let encoder = RandomDistributedScalarEncoder::new(RdseParams {
///     size: 1000,
///     sparsity: 0.05,
///     resolution: 1.0,
///     seed: 7,
/// }).unwrap();
///
/// let sdr = encoder.encode(50.0).unwrap();
/// assert_eq!(sdr.get_sum(), 50);
/// assert_eq!(sdr, encoder.encode(50.9).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct RandomDistributedScalarEncoder {
    size: UInt,
    active_bits: UInt,
    resolution: f64,
    seed: u64,
}

/// Type alias for convenience.
pub type Rdse = RandomDistributedScalarEncoder;

impl RandomDistributedScalarEncoder {
    /// Creates a new RDSE.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero, the sparsity is outside `(0, 1]`,
    /// `size * sparsity` rounds to zero bits or the resolution is not positive.
    pub fn new(params: RdseParams) -> Result<Self> {
        if params.size == 0 {
            return Err(HtmError::InvalidParameter {
                name: "size",
                message: "Size must be > 0".to_string(),
            });
        }

        if !(params.sparsity > 0.0 && params.sparsity <= 1.0) {
            return Err(HtmError::InvalidParameter {
                name: "sparsity",
                message: format!("Sparsity must be in (0, 1], got {}", params.sparsity),
            });
        }

        let active_bits = (f64::from(params.size) * params.sparsity).round() as UInt;
        if active_bits == 0 {
            return Err(HtmError::InvalidParameter {
                name: "sparsity",
                message: format!(
                    "size * sparsity = {} rounds to zero active bits",
                    f64::from(params.size) * params.sparsity
                ),
            });
        }

        if !(params.resolution.is_finite() && params.resolution > 0.0) {
            return Err(HtmError::InvalidParameter {
                name: "resolution",
                message: format!("Resolution must be > 0, got {}", params.resolution),
            });
        }

        Ok(Self {
            size: params.size,
            active_bits,
            resolution: params.resolution,
            seed: params.seed,
        })
    }

    /// Returns the number of active bits.
    pub fn active_bits(&self) -> UInt {
        self.active_bits
    }

    /// Returns the resolution.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Returns the seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the bucket a value falls into.
    pub fn bucket(&self, value: f64) -> i64 {
        (value / self.resolution).floor() as i64
    }

    /// Derives the sampling key for a bucket.
    fn bucket_key(&self, bucket: i64) -> u64 {
        let seed_lo = self.seed as u32;
        let seed_hi = (self.seed >> 32) as u32;
        let word_lo = bucket as u64 as u32;
        let word_hi = ((bucket as u64) >> 32) as u32;

        let lo = murmur_hash3_32(&[word_lo, word_hi], seed_lo);
        let hi = murmur_hash3_32(&[word_hi, word_lo], seed_hi ^ 0x9e37_79b9);
        (u64::from(hi) << 32) | u64::from(lo)
    }
}

impl Encoder<f64> for RandomDistributedScalarEncoder {
    fn size(&self) -> usize {
        self.size as usize
    }

    fn encode(&self, value: f64) -> Result<Sdr> {
        if !value.is_finite() {
            return Err(HtmError::InvalidInput(format!(
                "scalar encoder cannot encode non-finite value {value}"
            )));
        }

        let mut rng = Random::new(self.bucket_key(self.bucket(value)));
        let mut sparse: Vec<ElemSparse> = rng
            .sample_indices(self.size as usize, self.active_bits as usize)
            .into_iter()
            .map(|idx| idx as ElemSparse)
            .collect();
        sparse.sort_unstable();

        Ok(Sdr::from_sparse_unchecked(self.size as usize, sparse))
    }
}

/// MurmurHash3 (x86, 32-bit) over a slice of 32-bit words.
#[inline]
fn murmur_hash3_32(words: &[u32], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    for &word in words {
        let mut k = word;
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    // Finalization mix
    h ^= (words.len() * 4) as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;

    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(seed: u64) -> Rdse {
        Rdse::new(RdseParams {
            size: 1000,
            sparsity: 0.05,
            resolution: 1.0,
            seed,
        })
        .unwrap()
    }

    #[test]
    fn test_create_rdse() {
        let encoder = encoder(1);
        assert_eq!(encoder.size(), 1000);
        assert_eq!(encoder.active_bits(), 50);
    }

    #[test]
    fn test_encode_exact_active_bits() {
        let encoder = encoder(1);
        for value in [-1e9, -3.5, 0.0, 3.0, 44.4, 1e12] {
            let sdr = encoder.encode(value).unwrap();
            assert_eq!(sdr.get_sum(), 50);
            assert_eq!(sdr.size(), 1000);
        }
    }

    #[test]
    fn test_encode_non_finite_rejected() {
        let encoder = encoder(1);
        assert!(matches!(
            encoder.encode(f64::NAN),
            Err(HtmError::InvalidInput(_))
        ));
        assert!(encoder.encode(f64::INFINITY).is_err());
    }

    #[test]
    fn test_same_bucket_same_bits() {
        let encoder = encoder(42);
        assert_eq!(encoder.bucket(10.2), encoder.bucket(10.9));
        assert_eq!(encoder.encode(10.2).unwrap(), encoder.encode(10.9).unwrap());
        assert_eq!(encoder.bucket(-0.5), -1);
    }

    #[test]
    fn test_adjacent_buckets_differ() {
        let encoder = encoder(42);
        let a = encoder.encode(10.0).unwrap();
        let b = encoder.encode(11.0).unwrap();
        assert_ne!(a, b);
        // Chance overlap of two random 50-of-1000 samples stays small.
        assert!(a.get_overlap(&b) < 20);
    }

    #[test]
    fn test_deterministic_encoding() {
        let sdr1 = encoder(42).encode(44.4).unwrap();
        let sdr2 = encoder(42).encode(44.4).unwrap();
        assert_eq!(sdr1, sdr2);
    }

    #[test]
    fn test_different_seeds() {
        let sdr1 = encoder(42).encode(44.4).unwrap();
        let sdr2 = encoder(123).encode(44.4).unwrap();
        assert_ne!(sdr1, sdr2);
    }

    #[test]
    fn test_invalid_params() {
        let base = RdseParams {
            size: 1000,
            sparsity: 0.05,
            resolution: 1.0,
            seed: 0,
        };
        assert!(Rdse::new(RdseParams { size: 0, ..base.clone() }).is_err());
        assert!(Rdse::new(RdseParams { sparsity: 0.0, ..base.clone() }).is_err());
        assert!(Rdse::new(RdseParams { sparsity: 1.5, ..base.clone() }).is_err());
        assert!(Rdse::new(RdseParams { sparsity: 0.0004, ..base.clone() }).is_err());
        assert!(Rdse::new(RdseParams { resolution: 0.0, ..base.clone() }).is_err());
        assert!(Rdse::new(RdseParams { resolution: -1.0, ..base }).is_err());
    }

    #[test]
    fn test_murmur_hash_known_value() {
        // Reference MurmurHash3_x86_32 of zero bytes with seed 0.
        assert_eq!(murmur_hash3_32(&[], 0), 0);
        assert_ne!(murmur_hash3_32(&[1], 0), murmur_hash3_32(&[1], 1));
    }
}
