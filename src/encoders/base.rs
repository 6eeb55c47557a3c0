//! Base encoder trait.

use crate::error::Result;
use crate::types::Sdr;

/// Trait for all encoders.
///
/// Encoders convert input values into SDR representations. An encoder is
/// stateless once constructed: the same value always yields the same SDR.
pub trait Encoder<T> {
    /// Returns the total size of the output SDR.
    fn size(&self) -> usize;

    /// Encodes a value into a new SDR of `self.size()` bits.
    fn encode(&self, value: T) -> Result<Sdr>;
}
