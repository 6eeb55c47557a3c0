//! # htm-anomaly - streaming anomaly detection with Hierarchical Temporal Memory
//!
//! A single-pass, always-learning anomaly detector for scalar time series.
//! Every `(timestamp, value)` observation flows through four stages:
//!
//! - **Encoders**: the value and the timestamp become sparse bit patterns
//! - **Spatial Pooler**: the concatenated encoding becomes a fixed-sparsity column code
//! - **Temporal Memory**: columns expand into cells that learn and predict sequences,
//!   yielding a raw anomaly score (fraction of unpredicted columns)
//! - **Anomaly Likelihood**: the raw score is turned into a calibrated log-likelihood
//!
//! ## Quick Start
//!
//! ```rust
//! use htm_anomaly::prelude::*;
//! use chrono::NaiveDate;
//!
//! let config = DetectorConfig::default();
//! let profile = StreamProfile::new(0.0, 100.0, 150);
//! let mut detector = HtmDetector::new(&config, profile).unwrap();
//!
//! let t0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let scores = detector.process(t0, 42.0).unwrap();
//! assert_eq!(scores.raw_score, 1.0);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): serialization derives, JSON configuration, experiment runner
//! - `remote`: HTTP-forwarding detector backend

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod types;
pub mod algorithms;
pub mod encoders;
pub mod detector;
pub mod utils;

/// Re-export of commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::types::{
        Sdr, SdrSparse,
        CellIdx, Segment, Synapse, Permanence,
        Real, Score, UInt,
    };
    pub use crate::algorithms::{
        SpatialPooler, SpatialPoolerParams,
        TemporalMemory, TemporalMemoryParams,
        Connections, ConnectionsParams,
        Anomaly, AnomalyLikelihood, AnomalyLikelihoodParams,
    };
    pub use crate::encoders::{
        Encoder,
        ScalarEncoder, ScalarEncoderParams,
        RandomDistributedScalarEncoder, RdseParams,
        DateEncoder, DateEncoderParams,
        RecordEncoder, TimeEncoding,
    };
    pub use crate::detector::{
        create_detector, AnomalyDetector, AnomalyScores, Backend,
        DetectorConfig, HtmDetector, StreamProfile,
    };
    #[cfg(feature = "serde")]
    pub use crate::detector::{CommandRunner, ExperimentRunner};
    pub use crate::utils::Random;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library.
pub mod error {
    use thiserror::Error;

    /// Main error type for htm-anomaly operations.
    #[derive(Error, Debug)]
    pub enum HtmError {
        /// A configuration value is missing or out of range.
        #[error("Invalid parameter '{name}': {message}")]
        InvalidParameter {
            /// Name of the invalid parameter.
            name: &'static str,
            /// Description of the error.
            message: String,
        },

        /// Two or more configuration values contradict each other.
        #[error("Incompatible parameters: {0}")]
        IncompatibleParameters(String),

        /// The configuration file has a missing, unknown or mistyped key.
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        /// A per-step input was rejected. The detector state is unchanged.
        #[error("Invalid input: {0}")]
        InvalidInput(String),

        /// Index out of bounds.
        #[error("Index {index} out of bounds (size: {size})")]
        IndexOutOfBounds {
            /// The invalid index.
            index: usize,
            /// The valid size.
            size: usize,
        },

        /// SDR data is invalid (e.g., unsorted sparse indices).
        #[error("Invalid SDR data: {0}")]
        InvalidSdrData(String),

        /// Serialization error.
        #[cfg(feature = "serde")]
        #[error("Serialization error: {0}")]
        Serialization(#[from] serde_json::Error),

        /// I/O error.
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        /// The external experiment command failed or produced no score.
        #[error("Experiment failed: {0}")]
        Experiment(String),

        /// The remote detector could not be reached or answered badly.
        #[cfg(feature = "remote")]
        #[error("Remote detector error: {0}")]
        Remote(#[from] reqwest::Error),
    }

    impl HtmError {
        /// Returns true for errors raised while validating configuration.
        #[must_use]
        pub fn is_configuration_error(&self) -> bool {
            matches!(
                self,
                Self::InvalidParameter { .. }
                    | Self::IncompatibleParameters(_)
                    | Self::InvalidConfig(_)
            )
        }
    }

    /// Result type alias using `HtmError`.
    pub type Result<T> = std::result::Result<T, HtmError>;
}

pub use error::{HtmError, Result};
