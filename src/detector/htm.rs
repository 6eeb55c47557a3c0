//! The in-process HTM detector.

use super::{AnomalyDetector, AnomalyScores, DetectorConfig, StreamProfile};
use crate::algorithms::{AnomalyLikelihood, SpatialPooler, TemporalMemory};
use crate::encoders::{Encoder, RecordEncoder};
use crate::error::{HtmError, Result};
use crate::types::{Score, UInt};

use chrono::NaiveDateTime;
use tracing::{info, trace, warn};

/// One stream's encoder, spatial pooler, temporal memory and likelihood
/// estimator, advanced together one observation at a time.
///
/// Learning is always on. Two detectors built from the same configuration
/// and profile produce identical scores for identical input.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::detector::{DetectorConfig, HtmDetector, StreamProfile};
/// use chrono::NaiveDate;
///
/// let mut detector = HtmDetector::new(&DetectorConfig::default(), StreamProfile::new(0.0, 10.0, 50)).unwrap();
/// let t = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
///
/// let scores = detector.process(t, 4.2).unwrap();
/// assert_eq!(scores.raw_score, 1.0);
/// assert_eq!(scores.anomaly_score, scores.raw_score);
/// ```
#[derive(Debug, Clone)]
pub struct HtmDetector {
    encoder: RecordEncoder,
    sp: SpatialPooler,
    tm: TemporalMemory,
    likelihood: Option<AnomalyLikelihood>,
    profile: StreamProfile,
    last_timestamp: Option<NaiveDateTime>,
    iteration: u64,
}

impl HtmDetector {
    /// Builds a detector for one stream.
    ///
    /// The value resolution is taken from the configuration, or derived from
    /// the profile's operating range when the configuration omits it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration or the profile is
    /// invalid.
    pub fn new(config: &DetectorConfig, profile: StreamProfile) -> Result<Self> {
        config.validate()?;
        profile.validate()?;

        let resolution = config
            .enc
            .value
            .resolution
            .unwrap_or_else(|| profile.default_resolution());
        let encoder = RecordEncoder::new(config.value_encoder_params(resolution), config.time_encoding())?;

        let num_inputs = UInt::try_from(encoder.size()).map_err(|_| HtmError::InvalidParameter {
            name: "size",
            message: format!("Encoding width {} does not fit in 32 bits", encoder.size()),
        })?;
        let sp = SpatialPooler::new(config.sp_params(num_inputs))?;
        let tm = TemporalMemory::new(config.tm_params())?;

        let likelihood = if config.anomaly.likelihood.enabled {
            Some(AnomalyLikelihood::new(
                config.likelihood_params(profile.probationary_period),
            )?)
        } else {
            None
        };

        info!(
            encoding_width = encoder.size(),
            columns = sp.num_columns(),
            cells = tm.num_cells(),
            resolution,
            probationary_period = profile.probationary_period,
            likelihood = likelihood.is_some(),
            "HTM detector created"
        );

        Ok(Self {
            encoder,
            sp,
            tm,
            likelihood,
            profile,
            last_timestamp: None,
            iteration: 0,
        })
    }

    /// Feeds one observation through the pipeline, learning from it.
    ///
    /// A timestamp that does not advance past the previous one is logged and
    /// processed anyway.
    ///
    /// # Errors
    ///
    /// Returns [`HtmError::InvalidInput`] for a non-finite value. The
    /// detector state is left untouched in that case.
    pub fn process(&mut self, timestamp: NaiveDateTime, value: f64) -> Result<AnomalyScores> {
        if !value.is_finite() {
            warn!(%timestamp, value, "Rejected non-finite value");
            return Err(HtmError::InvalidInput(format!(
                "value at {timestamp} is not finite: {value}"
            )));
        }

        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                warn!(%timestamp, %last, "Timestamp does not advance, processing anyway");
            }
        }

        let encoding = self.encoder.encode((timestamp, value))?;
        let active_columns = self.sp.compute(&encoding, true)?;
        let raw_score: Score = self.tm.compute(&active_columns, true)?;

        let anomaly_score = match self.likelihood.as_mut() {
            Some(likelihood) => likelihood.log_anomaly_score(raw_score).unwrap_or(raw_score),
            None => raw_score,
        };

        self.iteration += 1;
        self.last_timestamp = Some(timestamp);

        trace!(
            iteration = self.iteration,
            %timestamp,
            value,
            raw_score,
            anomaly_score,
            "Processed record"
        );

        Ok(AnomalyScores {
            anomaly_score,
            raw_score,
        })
    }

    /// Number of observations processed.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The stream profile the detector was built for.
    pub fn profile(&self) -> &StreamProfile {
        &self.profile
    }

    /// The record encoder.
    pub fn encoder(&self) -> &RecordEncoder {
        &self.encoder
    }

    /// The spatial pooler.
    pub fn spatial_pooler(&self) -> &SpatialPooler {
        &self.sp
    }

    /// The temporal memory.
    pub fn temporal_memory(&self) -> &TemporalMemory {
        &self.tm
    }

    /// The likelihood estimator, absent when disabled.
    pub fn likelihood(&self) -> Option<&AnomalyLikelihood> {
        self.likelihood.as_ref()
    }
}

impl AnomalyDetector for HtmDetector {
    fn process(&mut self, timestamp: NaiveDateTime, value: f64) -> Result<AnomalyScores> {
        HtmDetector::process(self, timestamp, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn small_config() -> DetectorConfig {
        let mut config = DetectorConfig::default();
        config.enc.value.size = 400;
        config.enc.value.resolution = Some(0.05);
        config.enc.time.time_of_day = (5, 4.0);
        config.sp.column_count = 256;
        config.sp.potential_pct = 0.5;
        config.sp.local_area_density = 0.04;
        config.tm.cells_per_column = 4;
        config.tm.max_segments_per_cell = 16;
        config.seed = 7;
        config
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn value_at(i: i64) -> f64 {
        (i as f64 * std::f64::consts::TAU / 24.0).sin()
    }

    #[test]
    fn test_create() {
        let detector = HtmDetector::new(&small_config(), StreamProfile::new(-1.0, 1.0, 20)).unwrap();
        assert_eq!(detector.iteration(), 0);
        assert_eq!(detector.spatial_pooler().num_inputs(), detector.encoder().size());
        assert_eq!(detector.temporal_memory().num_columns(), 256);
        assert_eq!(detector.likelihood().unwrap().probationary_period(), 20);
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let mut config = small_config();
        config.tm.min_threshold = 30;
        assert!(HtmDetector::new(&config, StreamProfile::new(0.0, 1.0, 10)).is_err());

        assert!(HtmDetector::new(&small_config(), StreamProfile::new(2.0, 1.0, 10)).is_err());
    }

    #[test]
    fn test_derived_resolution() {
        let mut config = small_config();
        config.enc.value.resolution = None;
        let detector = HtmDetector::new(&config, StreamProfile::new(0.0, 13.0, 10)).unwrap();
        assert!((detector.encoder().value_encoder().resolution() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_first_record_fully_anomalous() {
        let mut detector = HtmDetector::new(&small_config(), StreamProfile::new(-1.0, 1.0, 20)).unwrap();
        let scores = detector.process(start(), 0.3).unwrap();
        assert_eq!(scores.raw_score, 1.0);
        assert_eq!(scores.anomaly_score, 1.0);
        assert_eq!(detector.iteration(), 1);
    }

    #[test]
    fn test_probation_passes_raw_score() {
        let mut detector = HtmDetector::new(&small_config(), StreamProfile::new(-1.0, 1.0, 30)).unwrap();
        for i in 0..30 {
            let scores = detector
                .process(start() + Duration::hours(i), value_at(i))
                .unwrap();
            assert_eq!(scores.anomaly_score, scores.raw_score);
            assert!((0.0..=1.0).contains(&scores.raw_score));
        }
    }

    #[test]
    fn test_likelihood_disabled() {
        let mut config = small_config();
        config.anomaly.likelihood.enabled = false;
        let mut detector = HtmDetector::new(&config, StreamProfile::new(-1.0, 1.0, 0)).unwrap();
        assert!(detector.likelihood().is_none());

        for i in 0..40 {
            let scores = detector
                .process(start() + Duration::hours(i), value_at(i))
                .unwrap();
            assert_eq!(scores.anomaly_score, scores.raw_score);
        }
    }

    #[test]
    fn test_non_finite_value_leaves_state_untouched() {
        let profile = StreamProfile::new(-1.0, 1.0, 10);
        let mut clean = HtmDetector::new(&small_config(), profile).unwrap();
        let mut interrupted = HtmDetector::new(&small_config(), profile).unwrap();

        for i in 0..30 {
            let t = start() + Duration::hours(i);
            if i == 12 {
                assert!(matches!(
                    interrupted.process(t, f64::NAN),
                    Err(HtmError::InvalidInput(_))
                ));
                assert!(interrupted.process(t, f64::INFINITY).is_err());
            }
            let expected = clean.process(t, value_at(i)).unwrap();
            let actual = interrupted.process(t, value_at(i)).unwrap();
            assert_eq!(expected, actual);
        }
        assert_eq!(clean.iteration(), interrupted.iteration());
    }

    #[test]
    fn test_out_of_order_timestamp_processed() {
        let mut detector = HtmDetector::new(&small_config(), StreamProfile::new(-1.0, 1.0, 10)).unwrap();
        detector.process(start() + Duration::hours(2), 0.1).unwrap();
        detector.process(start(), 0.2).unwrap();
        detector.process(start(), 0.2).unwrap();
        assert_eq!(detector.iteration(), 3);
    }

    #[test]
    fn test_deterministic() {
        let profile = StreamProfile::new(-1.0, 1.0, 24);
        let mut a = HtmDetector::new(&small_config(), profile).unwrap();
        let mut b = HtmDetector::new(&small_config(), profile).unwrap();

        for i in 0..72 {
            let t = start() + Duration::hours(i);
            assert_eq!(a.process(t, value_at(i)).unwrap(), b.process(t, value_at(i)).unwrap());
        }
    }

    #[test]
    fn test_through_trait_object() {
        let mut detector: Box<dyn AnomalyDetector> =
            Box::new(HtmDetector::new(&small_config(), StreamProfile::new(-1.0, 1.0, 10)).unwrap());
        assert_eq!(detector.process(start(), 0.0).unwrap().raw_score, 1.0);
    }
}
