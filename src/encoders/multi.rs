//! Record encoder: the combined value and timestamp encoding.
//!
//! Each observation is encoded field by field and the field SDRs are
//! concatenated into the single input vector the spatial pooler sees. The
//! value field always comes first.

use crate::encoders::{DateEncoder, DateEncoderParams, Encoder, Rdse, RdseParams};
use crate::error::Result;
use crate::types::{Sdr, UInt};

use chrono::NaiveDateTime;

/// A field in the combined encoding with its name, offset, and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderField {
    /// Name of this field.
    pub name: &'static str,
    /// Starting bit offset in the combined SDR.
    pub offset: UInt,
    /// Size of this encoder's output in bits.
    pub size: UInt,
}

/// How the timestamp of a record is encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeEncoding {
    /// Cyclic calendar features (time of day, weekday, season, weekend).
    Calendar(DateEncoderParams),
    /// The timestamp's unix seconds, encoded like any other scalar.
    UnixSeconds(RdseParams),
}

#[derive(Debug, Clone)]
enum TimeEncoder {
    Calendar(DateEncoder),
    UnixSeconds(Rdse),
}

impl TimeEncoder {
    fn size(&self) -> usize {
        match self {
            Self::Calendar(encoder) => encoder.size(),
            Self::UnixSeconds(encoder) => encoder.size(),
        }
    }

    fn encode(&self, timestamp: NaiveDateTime) -> Result<Sdr> {
        match self {
            Self::Calendar(encoder) => encoder.encode(timestamp),
            Self::UnixSeconds(encoder) => {
                encoder.encode(timestamp.and_utc().timestamp() as f64)
            }
        }
    }
}

/// Encodes `(timestamp, value)` records into one concatenated SDR.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::encoders::{DateEncoderParams, Encoder, RdseParams, RecordEncoder, TimeEncoding};
/// use chrono::NaiveDate;
///
/// let encoder = RecordEncoder::new(
///     RdseParams { size: 400, sparsity: 0.05, resolution: 0.5, seed: 1 },
///     TimeEncoding::Calendar(DateEncoderParams::default()),
/// ).unwrap();
/// assert_eq!(encoder.size(), 400 + 54);
///
/// let t = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let sdr = encoder.encode((t, 3.0)).unwrap();
/// assert_eq!(sdr.get_sum(), 20 + 21);
/// ```
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    value: Rdse,
    time: TimeEncoder,
    fields: Vec<EncoderField>,
}

impl RecordEncoder {
    /// Creates a record encoder.
    ///
    /// # Errors
    ///
    /// Returns an error if either sub-encoder rejects its parameters.
    pub fn new(value: RdseParams, time: TimeEncoding) -> Result<Self> {
        let value = Rdse::new(value)?;
        let time = match time {
            TimeEncoding::Calendar(params) => TimeEncoder::Calendar(DateEncoder::new(params)?),
            TimeEncoding::UnixSeconds(params) => TimeEncoder::UnixSeconds(Rdse::new(params)?),
        };

        let fields = vec![
            EncoderField {
                name: "value",
                offset: 0,
                size: value.size() as UInt,
            },
            EncoderField {
                name: "timestamp",
                offset: value.size() as UInt,
                size: time.size() as UInt,
            },
        ];

        Ok(Self {
            value,
            time,
            fields,
        })
    }

    /// Returns the layout of the combined encoding.
    pub fn fields(&self) -> &[EncoderField] {
        &self.fields
    }

    /// Returns the value encoder.
    pub fn value_encoder(&self) -> &Rdse {
        &self.value
    }
}

impl Encoder<(NaiveDateTime, f64)> for RecordEncoder {
    fn size(&self) -> usize {
        self.value.size() + self.time.size()
    }

    fn encode(&self, (timestamp, value): (NaiveDateTime, f64)) -> Result<Sdr> {
        let value_bits = self.value.encode(value)?;
        let time_bits = self.time.encode(timestamp)?;
        Ok(Sdr::concatenate(&[&value_bits, &time_bits]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn value_params() -> RdseParams {
        RdseParams {
            size: 200,
            sparsity: 0.1,
            resolution: 1.0,
            seed: 3,
        }
    }

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 2, 3)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_layout() {
        let encoder = RecordEncoder::new(
            value_params(),
            TimeEncoding::Calendar(DateEncoderParams::default()),
        )
        .unwrap();

        assert_eq!(encoder.size(), 254);
        assert_eq!(encoder.fields()[0].offset, 0);
        assert_eq!(encoder.fields()[1].offset, 200);
        assert_eq!(encoder.fields()[1].size, 54);
    }

    #[test]
    fn test_value_bits_precede_time_bits() {
        let encoder = RecordEncoder::new(
            value_params(),
            TimeEncoding::Calendar(DateEncoderParams::default()),
        )
        .unwrap();
        let sdr = encoder.encode((at(5), 12.0)).unwrap();

        let value_part = sdr.get_sparse().iter().filter(|&&b| b < 200).count();
        let time_part = sdr.get_sparse().iter().filter(|&&b| b >= 200).count();
        assert_eq!(value_part, 20);
        assert_eq!(time_part, 21);

        let value_only = encoder.value_encoder().encode(12.0).unwrap();
        assert_eq!(&sdr.get_sparse()[..20], value_only.get_sparse());
    }

    #[test]
    fn test_unix_seconds_mode() {
        let encoder = RecordEncoder::new(
            value_params(),
            TimeEncoding::UnixSeconds(RdseParams {
                size: 100,
                sparsity: 0.1,
                resolution: 3600.0,
                seed: 9,
            }),
        )
        .unwrap();
        assert_eq!(encoder.size(), 300);

        let a = encoder.encode((at(5), 1.0)).unwrap();
        let b = encoder.encode((at(6), 1.0)).unwrap();
        assert_eq!(a.get_sum(), 30);
        assert_ne!(a, b);
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let encoder = RecordEncoder::new(
            value_params(),
            TimeEncoding::Calendar(DateEncoderParams::default()),
        )
        .unwrap();
        assert!(encoder.encode((at(1), f64::NAN)).is_err());
    }
}
