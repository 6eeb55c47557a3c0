//! Streaming anomaly detectors.
//!
//! A detector consumes one `(timestamp, value)` observation at a time and
//! returns its [`AnomalyScores`]. Two backends implement [`AnomalyDetector`]:
//!
//! - [`HtmDetector`] runs the encoder, spatial pooler, temporal memory and
//!   likelihood pipeline in process.
//! - `RemoteDetector` (feature `remote`) forwards every observation to an
//!   HTTP service and relays its scores.
//!
//! [`create_detector`] picks the backend at runtime.

mod config;
#[cfg(feature = "serde")]
mod experiment;
mod htm;
#[cfg(feature = "remote")]
mod remote;

pub use config::{
    AnomalyConfig, DetectorConfig, EncoderConfig, LikelihoodConfig, SpConfig, StreamProfile,
    TmConfig, ValueEncoderConfig,
};
#[cfg(feature = "serde")]
pub use experiment::{grid_search, CommandRunner, ExperimentRunner};
pub use htm::HtmDetector;
#[cfg(feature = "remote")]
pub use remote::RemoteDetector;

use crate::error::Result;
use crate::types::Score;

use chrono::NaiveDateTime;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scores of one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AnomalyScores {
    /// The reported score: the log-likelihood once past probation, the raw
    /// score before that or when likelihood is disabled.
    pub anomaly_score: Score,
    /// Fraction of active columns that were not predicted, in `[0, 1]`.
    pub raw_score: Score,
}

/// A streaming anomaly detector.
pub trait AnomalyDetector: Send {
    /// Consumes one observation and returns its scores.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HtmError::InvalidInput`] for a non-finite value and
    /// backend-specific errors otherwise.
    fn process(&mut self, timestamp: NaiveDateTime, value: f64) -> Result<AnomalyScores>;
}

/// Where observations are scored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    /// The in-process HTM pipeline.
    #[default]
    InProcess,
    /// An HTTP detector service at the given base URL.
    #[cfg(feature = "remote")]
    Remote {
        /// Base URL, e.g. `http://localhost:8080`.
        url: String,
    },
}

/// Builds a detector for one stream on the chosen backend.
///
/// # Errors
///
/// Returns a configuration error for an invalid configuration or profile,
/// and for the remote backend any error raised while initializing the
/// service.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::detector::{create_detector, Backend, DetectorConfig, StreamProfile};
///
/// let detector = create_detector(
///     &DetectorConfig::default(),
///     StreamProfile::new(0.0, 1.0, 100),
///     &Backend::InProcess,
/// );
/// assert!(detector.is_ok());
/// ```
pub fn create_detector(
    config: &DetectorConfig,
    profile: StreamProfile,
    backend: &Backend,
) -> Result<Box<dyn AnomalyDetector>> {
    match backend {
        Backend::InProcess => Ok(Box::new(HtmDetector::new(config, profile)?)),
        #[cfg(feature = "remote")]
        Backend::Remote { url } => Ok(Box::new(RemoteDetector::connect(url, &profile)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_create_in_process() {
        let mut detector = create_detector(
            &DetectorConfig::default(),
            StreamProfile::new(0.0, 1.0, 10),
            &Backend::default(),
        )
        .unwrap();

        let t = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(detector.process(t, 0.5).unwrap().raw_score, 1.0);
        assert!(detector.process(t, f64::NAN).is_err());
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let mut config = DetectorConfig::default();
        config.sp.column_count = 0;
        assert!(create_detector(&config, StreamProfile::new(0.0, 1.0, 10), &Backend::InProcess).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_scores_wire_format() {
        let scores = AnomalyScores {
            anomaly_score: 0.25,
            raw_score: 0.5,
        };
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"anomalyScore":0.25,"rawScore":0.5}"#);
    }
}
