//! Encoders for converting observations into SDR representations.
//!
//! # Available Encoders
//!
//! - [`RandomDistributedScalarEncoder`]: hashes value buckets to random bit sets
//! - [`ScalarEncoder`]: contiguous, optionally periodic, runs of active bits
//! - [`DateEncoder`]: cyclic calendar features of a timestamp
//! - [`RecordEncoder`]: value and timestamp encodings concatenated
//!
//! # Example
//!
//! ```rust
//! use htm_anomaly::encoders::{Encoder, RandomDistributedScalarEncoder, RdseParams};
//!
//! let encoder = RandomDistributedScalarEncoder::new(RdseParams {
//!     size: 400,
//!     sparsity: 0.1,
//!     resolution: 0.5,
//!     seed: 1,
//! }).unwrap();
//!
//! let sdr = encoder.encode(50.0).unwrap();
//! assert_eq!(sdr.get_sum(), 40);
//! ```

mod base;
pub mod date;
mod multi;
mod rdse;
mod scalar;

pub use base::Encoder;
pub use date::{DateEncoder, DateEncoderParams};
pub use multi::{EncoderField, RecordEncoder, TimeEncoding};
pub use rdse::{RandomDistributedScalarEncoder, Rdse, RdseParams};
pub use scalar::{ScalarEncoder, ScalarEncoderParams};
