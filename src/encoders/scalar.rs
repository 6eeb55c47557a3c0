//! Scalar Encoder implementation.
//!
//! The Scalar Encoder converts a bounded numeric value into a contiguous run
//! of active bits whose position is proportional to the value. Nearby values
//! share bits. With `periodic` set the run wraps around the end of the
//! output, so the maximum and minimum of the range become neighbors.

use crate::encoders::Encoder;
use crate::error::{HtmError, Result};
use crate::types::{ElemSparse, Sdr, UInt};

/// Parameters for creating a Scalar Encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarEncoderParams {
    /// Minimum value of the input range.
    pub minimum: f64,

    /// Maximum value of the input range.
    pub maximum: f64,

    /// Number of active bits for each encoding.
    pub active_bits: UInt,

    /// Two inputs separated by more than the radius have non-overlapping
    /// representations. Determines the output size.
    pub radius: f64,

    /// Whether the input range is periodic (e.g., hours of the day).
    pub periodic: bool,

    /// Whether inputs are enumerated categories with disjoint representations.
    /// Overrides `radius` and `periodic`.
    pub category: bool,
}

impl Default for ScalarEncoderParams {
    fn default() -> Self {
        Self {
            minimum: 0.0,
            maximum: 100.0,
            active_bits: 21,
            radius: 10.0,
            periodic: false,
            category: false,
        }
    }
}

/// Encodes bounded scalar values into contiguous runs of active bits.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::encoders::{Encoder, ScalarEncoder, ScalarEncoderParams};
///
/// let encoder = ScalarEncoder::new(ScalarEncoderParams {
///     minimum: 0.0,
///     maximum: 24.0,
///     active_bits: 4,
///     radius: 4.0,
///     periodic: true,
///     category: false,
/// }).unwrap();
///
/// assert_eq!(encoder.size(), 24);
/// let sdr = encoder.encode(23.5).unwrap();
/// assert_eq!(sdr.get_sparse(), &[0, 1, 2, 23]);
/// ```
#[derive(Debug, Clone)]
pub struct ScalarEncoder {
    minimum: f64,
    maximum: f64,
    size: UInt,
    active_bits: UInt,
    periodic: bool,
    category: bool,

    /// Input units per bucket.
    resolution: f64,

    /// Number of distinct start positions.
    num_buckets: UInt,
}

impl ScalarEncoder {
    /// Creates a new Scalar Encoder.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is empty, `active_bits` is zero, the
    /// radius is not positive or the resulting size cannot hold `active_bits`.
    pub fn new(params: ScalarEncoderParams) -> Result<Self> {
        if params.maximum.is_nan() || params.maximum <= params.minimum {
            return Err(HtmError::InvalidParameter {
                name: "maximum",
                message: "Maximum must be greater than minimum".to_string(),
            });
        }

        if params.active_bits == 0 {
            return Err(HtmError::InvalidParameter {
                name: "active_bits",
                message: "Must be > 0".to_string(),
            });
        }

        let range = params.maximum - params.minimum;

        let (size, num_buckets, resolution) = if params.category {
            let num_categories = range.round() as UInt + 1;
            (num_categories * params.active_bits, num_categories, 1.0)
        } else {
            if !(params.radius.is_finite() && params.radius > 0.0) {
                return Err(HtmError::InvalidParameter {
                    name: "radius",
                    message: format!("Radius must be > 0, got {}", params.radius),
                });
            }
            let resolution = params.radius / f64::from(params.active_bits);
            // Absorb rounding noise such as 7 / (1 / 3) = 21.000000000000004.
            let buckets = ((range / resolution - 1e-9).ceil() as UInt).max(1);
            if params.periodic {
                (buckets, buckets, range / f64::from(buckets))
            } else {
                let num_buckets = buckets + 1;
                (num_buckets + params.active_bits - 1, num_buckets, resolution)
            }
        };

        if size < params.active_bits {
            return Err(HtmError::InvalidParameter {
                name: "radius",
                message: format!(
                    "Output of {size} bits cannot hold {} active bits",
                    params.active_bits
                ),
            });
        }

        Ok(Self {
            minimum: params.minimum,
            maximum: params.maximum,
            size,
            active_bits: params.active_bits,
            periodic: params.periodic && !params.category,
            category: params.category,
            resolution,
            num_buckets,
        })
    }

    /// Returns the bucket index for a value.
    ///
    /// Periodic encoders wrap out-of-range values; others clip them.
    pub fn bucket_index(&self, value: f64) -> UInt {
        let range = self.maximum - self.minimum;
        if self.periodic {
            let offset = (value - self.minimum).rem_euclid(range);
            let bucket = (offset / self.resolution).floor() as UInt;
            bucket % self.num_buckets
        } else {
            let clipped = value.clamp(self.minimum, self.maximum);
            let bucket = ((clipped - self.minimum) / self.resolution).round() as UInt;
            bucket.min(self.num_buckets - 1)
        }
    }

    /// Returns the resolution.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Returns the number of active bits.
    pub fn active_bits(&self) -> UInt {
        self.active_bits
    }

    /// Returns whether this is a periodic encoder.
    pub fn periodic(&self) -> bool {
        self.periodic
    }

    fn block_width(&self) -> UInt {
        // Category blocks are laid end to end.
        if self.category {
            self.active_bits
        } else {
            1
        }
    }
}

impl Encoder<f64> for ScalarEncoder {
    fn size(&self) -> usize {
        self.size as usize
    }

    fn encode(&self, value: f64) -> Result<Sdr> {
        if !value.is_finite() {
            return Err(HtmError::InvalidInput(format!(
                "scalar encoder cannot encode non-finite value {value}"
            )));
        }

        let start = self.bucket_index(value) * self.block_width();

        let mut sparse: Vec<ElemSparse> = (0..self.active_bits)
            .map(|i| {
                if self.periodic {
                    (start + i) % self.size
                } else {
                    start + i
                }
            })
            .collect();
        sparse.sort_unstable();

        Ok(Sdr::from_sparse_unchecked(self.size as usize, sparse))
    }
}
