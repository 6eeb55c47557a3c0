//! Date Encoder implementation.
//!
//! The DateEncoder encodes cyclic attributes of a timestamp into an SDR:
//! - season: day of the year, periodic over 366 days
//! - day_of_week: Monday=0 through Sunday=6, periodic over 7 days
//! - weekend: Friday evening, Saturday and Sunday versus the rest
//! - time_of_day: hours since midnight, periodic over 24 hours
//!
//! Each enabled attribute owns its own contiguous block of the output.

use crate::encoders::scalar::{ScalarEncoder, ScalarEncoderParams};
use crate::encoders::Encoder;
use crate::error::{HtmError, Result};
use crate::types::{Sdr, UInt};

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for creating a Date Encoder.
///
/// A feature is enabled by giving it a non-zero number of active bits. The
/// pairs are `(active_bits, radius)`; the radius is in hours for the time of
/// day and in days for the season. Two timestamps further apart than the
/// radius share no bits for that feature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct DateEncoderParams {
    /// Active bits and radius (hours) of the time-of-day feature.
    pub time_of_day: (UInt, f64),

    /// Active bits of the day-of-week feature (radius one day).
    pub day_of_week: UInt,

    /// Active bits and radius (days) of the season feature.
    pub season: (UInt, f64),

    /// Active bits of each state of the weekend feature.
    pub weekend: UInt,
}

impl Default for DateEncoderParams {
    fn default() -> Self {
        Self {
            time_of_day: (21, 9.49),
            day_of_week: 0,
            season: (0, 30.0),
            weekend: 0,
        }
    }
}

/// Encodes timestamps into SDRs of cyclic calendar features.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::encoders::{DateEncoder, DateEncoderParams, Encoder};
/// use chrono::NaiveDate;
///
/// let encoder = DateEncoder::new(DateEncoderParams {
///     time_of_day: (21, 9.49),
///     ..Default::default()
/// }).unwrap();
///
/// let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// let late = encoder.encode(day.and_hms_opt(23, 59, 0).unwrap()).unwrap();
/// let early = encoder.encode(day.and_hms_opt(0, 1, 0).unwrap()).unwrap();
/// assert!(late.get_overlap(&early) > 0);
/// ```
#[derive(Debug, Clone)]
pub struct DateEncoder {
    season_encoder: Option<ScalarEncoder>,
    day_of_week_encoder: Option<ScalarEncoder>,
    weekend_encoder: Option<ScalarEncoder>,
    time_of_day_encoder: Option<ScalarEncoder>,

    params: DateEncoderParams,
    size: usize,
}

impl DateEncoder {
    /// Creates a new Date Encoder.
    ///
    /// # Errors
    ///
    /// Returns an error if an enabled feature has a radius that is not
    /// positive or too wide to fit its active bits in the period.
    pub fn new(params: DateEncoderParams) -> Result<Self> {
        let season_encoder = Self::periodic_feature("season", 366.0, params.season)?;
        let day_of_week_encoder =
            Self::periodic_feature("dayOfWeek", 7.0, (params.day_of_week, 1.0))?;
        let time_of_day_encoder = Self::periodic_feature("timeOfDay", 24.0, params.time_of_day)?;

        let weekend_encoder = if params.weekend > 0 {
            Some(ScalarEncoder::new(ScalarEncoderParams {
                minimum: 0.0,
                maximum: 1.0,
                active_bits: params.weekend,
                radius: 0.0,
                periodic: false,
                category: true,
            })?)
        } else {
            None
        };

        let size = [
            &season_encoder,
            &day_of_week_encoder,
            &weekend_encoder,
            &time_of_day_encoder,
        ]
        .iter()
        .filter_map(|encoder| encoder.as_ref())
        .map(Encoder::size)
        .sum();

        Ok(Self {
            season_encoder,
            day_of_week_encoder,
            weekend_encoder,
            time_of_day_encoder,
            params,
            size,
        })
    }

    fn periodic_feature(
        name: &'static str,
        period: f64,
        (active_bits, radius): (UInt, f64),
    ) -> Result<Option<ScalarEncoder>> {
        if active_bits == 0 {
            return Ok(None);
        }
        let encoder = ScalarEncoder::new(ScalarEncoderParams {
            minimum: 0.0,
            maximum: period,
            active_bits,
            radius,
            periodic: true,
            category: false,
        })
        .map_err(|err| HtmError::InvalidParameter {
            name,
            message: err.to_string(),
        })?;

        // A one-bit feature cannot tell any two timestamps apart.
        if encoder.size() <= 1 {
            return Ok(None);
        }
        Ok(Some(encoder))
    }

    /// Returns the parameters this encoder was built from.
    pub fn params(&self) -> &DateEncoderParams {
        &self.params
    }

    /// Checks if a timestamp falls on the weekend.
    ///
    /// Weekend is defined as: Friday evening (from 6pm), Saturday, and Sunday.
    pub fn is_weekend(timestamp: &NaiveDateTime) -> bool {
        match timestamp.weekday() {
            Weekday::Sat | Weekday::Sun => true,
            Weekday::Fri => timestamp.hour() >= 18,
            _ => false,
        }
    }

    fn hours_since_midnight(timestamp: &NaiveDateTime) -> f64 {
        f64::from(timestamp.num_seconds_from_midnight()) / 3600.0
    }
}

impl Encoder<NaiveDateTime> for DateEncoder {
    fn size(&self) -> usize {
        self.size
    }

    fn encode(&self, timestamp: NaiveDateTime) -> Result<Sdr> {
        let mut parts: Vec<Sdr> = Vec::with_capacity(4);

        if let Some(ref encoder) = self.season_encoder {
            parts.push(encoder.encode(f64::from(timestamp.ordinal0()))?);
        }

        if let Some(ref encoder) = self.day_of_week_encoder {
            let day = timestamp.weekday().num_days_from_monday();
            parts.push(encoder.encode(f64::from(day))?);
        }

        if let Some(ref encoder) = self.weekend_encoder {
            let val = if Self::is_weekend(&timestamp) { 1.0 } else { 0.0 };
            parts.push(encoder.encode(val)?);
        }

        if let Some(ref encoder) = self.time_of_day_encoder {
            parts.push(encoder.encode(Self::hours_since_midnight(&timestamp))?);
        }

        let refs: Vec<&Sdr> = parts.iter().collect();
        Ok(Sdr::concatenate(&refs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_default_is_time_of_day_only() {
        let encoder = DateEncoder::new(DateEncoderParams::default()).unwrap();
        assert_eq!(encoder.size(), 54);
        let sdr = encoder.encode(at(2020, 1, 1, 12, 0)).unwrap();
        assert_eq!(sdr.get_sum(), 21);
    }

    #[test]
    fn test_time_of_day_wraps_at_midnight() {
        let encoder = DateEncoder::new(DateEncoderParams::default()).unwrap();

        let late = encoder.encode(at(2020, 1, 1, 23, 59)).unwrap();
        let early = encoder.encode(at(2020, 1, 2, 0, 1)).unwrap();
        assert!(late.get_overlap(&early) > 0);

        let morning = encoder.encode(at(2020, 1, 1, 6, 0)).unwrap();
        let evening = encoder.encode(at(2020, 1, 1, 18, 0)).unwrap();
        assert_eq!(morning.get_overlap(&evening), 0);
    }

    #[test]
    fn test_disabled_features() {
        let encoder = DateEncoder::new(DateEncoderParams {
            time_of_day: (0, 4.0),
            day_of_week: 0,
            season: (0, 30.0),
            weekend: 0,
        })
        .unwrap();
        assert_eq!(encoder.size(), 0);
        assert!(encoder.encode(at(2020, 1, 1, 0, 0)).unwrap().is_empty());

        // One active bit with a radius covering the whole day is a single-bit feature.
        let single = DateEncoder::new(DateEncoderParams {
            time_of_day: (1, 24.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(single.size(), 0);
    }

    #[test]
    fn test_weekend_encoding() {
        let encoder = DateEncoder::new(DateEncoderParams {
            time_of_day: (0, 1.0),
            weekend: 3,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(encoder.size(), 6);

        // 2020-01-01 is a Wednesday, 2020-01-05 a Sunday
        let wednesday = encoder.encode(at(2020, 1, 1, 12, 0)).unwrap();
        let sunday = encoder.encode(at(2020, 1, 5, 12, 0)).unwrap();
        assert_eq!(wednesday.get_sparse(), &[0, 1, 2]);
        assert_eq!(sunday.get_sparse(), &[3, 4, 5]);
    }

    #[test]
    fn test_is_weekend() {
        assert!(DateEncoder::is_weekend(&at(2020, 1, 4, 10, 0)));
        assert!(DateEncoder::is_weekend(&at(2020, 1, 5, 10, 0)));
        assert!(DateEncoder::is_weekend(&at(2020, 1, 3, 18, 0)));
        assert!(!DateEncoder::is_weekend(&at(2020, 1, 3, 17, 59)));
        assert!(!DateEncoder::is_weekend(&at(2020, 1, 1, 23, 0)));
    }

    #[test]
    fn test_day_of_week_encoding() {
        let encoder = DateEncoder::new(DateEncoderParams {
            time_of_day: (0, 1.0),
            day_of_week: 3,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(encoder.size(), 21);

        // Monday 2020-01-06 versus Sunday 2020-01-05: adjacent through the wrap
        let monday = encoder.encode(at(2020, 1, 6, 0, 0)).unwrap();
        let sunday = encoder.encode(at(2020, 1, 5, 0, 0)).unwrap();
        let thursday = encoder.encode(at(2020, 1, 2, 0, 0)).unwrap();
        assert_eq!(monday.get_sparse(), &[0, 1, 2]);
        assert_eq!(sunday.get_sparse(), &[18, 19, 20]);
        assert_eq!(monday.get_overlap(&thursday), 0);

        // The same weekday at another hour encodes identically
        assert_eq!(monday, encoder.encode(at(2020, 1, 6, 15, 30)).unwrap());
    }

    #[test]
    fn test_season_encoding() {
        let encoder = DateEncoder::new(DateEncoderParams {
            time_of_day: (0, 1.0),
            season: (5, 30.0),
            ..Default::default()
        })
        .unwrap();

        let jan1 = encoder.encode(at(2020, 1, 1, 0, 0)).unwrap();
        let jan2 = encoder.encode(at(2020, 1, 2, 0, 0)).unwrap();
        let jul1 = encoder.encode(at(2020, 7, 1, 0, 0)).unwrap();
        let dec31 = encoder.encode(at(2019, 12, 31, 0, 0)).unwrap();

        assert!(jan1.get_overlap(&jan2) >= 4);
        assert_eq!(jan1.get_overlap(&jul1), 0);
        assert!(jan1.get_overlap(&dec31) > 0);
    }

    #[test]
    fn test_combined_layout() {
        let encoder = DateEncoder::new(DateEncoderParams {
            time_of_day: (4, 4.0),
            day_of_week: 2,
            season: (3, 91.5),
            weekend: 2,
        })
        .unwrap();

        // season 366 / (91.5 / 3) = 12, weekday 14, weekend 4, time 24
        assert_eq!(encoder.size(), 12 + 14 + 4 + 24);
        let sdr = encoder.encode(at(2020, 6, 15, 13, 0)).unwrap();
        assert_eq!(sdr.get_sum(), 3 + 2 + 2 + 4);
    }

    #[test]
    fn test_invalid_radius() {
        assert!(DateEncoder::new(DateEncoderParams {
            time_of_day: (21, 0.0),
            ..Default::default()
        })
        .is_err());
        assert!(DateEncoder::new(DateEncoderParams {
            time_of_day: (21, 240.0),
            ..Default::default()
        })
        .is_err());
    }
}
