//! Detector configuration.
//!
//! [`DetectorConfig`] is the immutable parameter snapshot a detector is built
//! from. Its JSON form uses the same camelCase keys as the parameter files
//! written by hyperparameter search:
//!
//! ```json
//! {
//!   "enc": { "value": { "size": 4000, "sparsity": 0.1, "resolution": 0.001 },
//!            "time": { "timeOfDay": [21, 9.49], "dayOfWeek": 0, "season": [0, 91.5], "weekend": 0 } },
//!   "sp": { "columnCount": 2048, "potentialPct": 0.4, ... },
//!   "tm": { "cellsPerColumn": 32, "activationThreshold": 13, ... },
//!   "anomaly": { "likelihood": { "probationaryPct": 0.1, "reestimationPeriod": 1 } }
//! }
//! ```
//!
//! Keys typed `Option` may be omitted, as may the keys that carry a
//! documented default. Any other missing key, and any unknown key, is an
//! error.

use crate::algorithms::{AnomalyLikelihoodParams, SpatialPoolerParams, TemporalMemoryParams};
use crate::encoders::{DateEncoder, DateEncoderParams, Rdse, RdseParams, TimeEncoding};
use crate::error::{HtmError, Result};
use crate::types::{Permanence, Real, UInt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The operating range and probationary length of one stream.
///
/// Supplied by the record source rather than the parameter file.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StreamProfile {
    /// Smallest value the stream is expected to produce.
    pub input_min: f64,
    /// Largest value the stream is expected to produce.
    pub input_max: f64,
    /// Leading observations scored by raw anomaly only.
    pub probationary_period: usize,
}

impl StreamProfile {
    /// Probationary periods derived from stream length never exceed this
    /// share of this many records.
    pub const PROBATION_RECORD_CAP: usize = 5000;

    /// Creates a stream profile.
    pub fn new(input_min: f64, input_max: f64, probationary_period: usize) -> Self {
        Self {
            input_min,
            input_max,
            probationary_period,
        }
    }

    /// Derives the probationary period from the length of a stream:
    /// `floor(min(pct * len, pct * 5000))`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use htm_anomaly::detector::StreamProfile;
    ///
    /// assert_eq!(StreamProfile::for_stream_length(0.0, 1.0, 4032, 0.15).probationary_period, 604);
    /// assert_eq!(StreamProfile::for_stream_length(0.0, 1.0, 22_695, 0.15).probationary_period, 750);
    /// ```
    pub fn for_stream_length(input_min: f64, input_max: f64, len: usize, pct: f64) -> Self {
        let by_length = pct * len as f64;
        let cap = pct * Self::PROBATION_RECORD_CAP as f64;
        Self::new(input_min, input_max, by_length.min(cap).floor().max(0.0) as usize)
    }

    /// Value resolution spreading the operating range over 130 buckets,
    /// never finer than 0.001.
    pub fn default_resolution(&self) -> f64 {
        ((self.input_max - self.input_min) / 130.0).max(0.001)
    }

    /// Checks that the operating range is a finite, ordered interval.
    ///
    /// # Errors
    ///
    /// Returns [`HtmError::InvalidParameter`] otherwise.
    pub fn validate(&self) -> Result<()> {
        if !(self.input_min.is_finite() && self.input_max.is_finite()) {
            return Err(HtmError::InvalidParameter {
                name: "inputMin",
                message: "Operating range must be finite".to_string(),
            });
        }
        if self.input_min > self.input_max {
            return Err(HtmError::InvalidParameter {
                name: "inputMax",
                message: format!(
                    "inputMax ({}) is below inputMin ({})",
                    self.input_max, self.input_min
                ),
            });
        }
        Ok(())
    }
}

/// Value encoder section, `enc.value`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct ValueEncoderConfig {
    /// Output width in bits.
    pub size: UInt,
    /// Fraction of active bits.
    pub sparsity: f64,
    /// Bucket width. Derived from the stream's operating range when omitted.
    pub resolution: Option<f64>,
    /// Encoder seed. The detector seed is used when omitted.
    pub seed: Option<u64>,
}

/// Encoder section, `enc`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct EncoderConfig {
    /// The value encoder.
    pub value: ValueEncoderConfig,
    /// Calendar features of the timestamp.
    pub time: DateEncoderParams,
    /// When present, the timestamp is encoded as unix seconds by a second
    /// scalar encoder and `time` is ignored.
    pub integer_time: Option<RdseParams>,
}

/// Spatial pooler section, `sp`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct SpConfig {
    /// Number of columns.
    pub column_count: UInt,
    /// Fraction of the potential neighborhood sampled into each pool.
    pub potential_pct: Real,
    /// Potential neighborhood radius. The whole encoding when omitted.
    pub potential_radius: Option<UInt>,
    /// Target fraction of active columns.
    pub local_area_density: Real,
    /// Minimum raw overlap for activation. Defaults to 0.
    #[cfg_attr(feature = "serde", serde(default))]
    pub stimulus_threshold: UInt,
    /// Permanence gained by synapses from active inputs.
    pub syn_perm_active_inc: Permanence,
    /// Permanence lost by synapses from inactive inputs.
    pub syn_perm_inactive_dec: Permanence,
    /// Connection threshold, shared with the temporal memory.
    pub syn_perm_connected: Permanence,
    /// Boosting strength, 0 disables boosting.
    pub boost_strength: Real,
    /// Whether the column space is a ring.
    pub wrap_around: bool,
    /// Global (true) or ring-local (false) inhibition. Defaults to true.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub global_inhibition: bool,
    /// Duty cycle averaging period. Defaults to 1000.
    #[cfg_attr(feature = "serde", serde(default = "default_duty_cycle_period"))]
    pub duty_cycle_period: UInt,
    /// Weak-column threshold as a share of the strongest overlap duty cycle.
    /// Defaults to 0.001.
    #[cfg_attr(feature = "serde", serde(default = "default_min_pct_overlap_duty_cycle"))]
    pub min_pct_overlap_duty_cycle: Real,
}

/// Temporal memory section, `tm`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct TmConfig {
    /// Cells per column.
    pub cells_per_column: UInt,
    /// Connected active synapses for a segment to become active.
    pub activation_threshold: UInt,
    /// Permanence of newly grown synapses.
    pub initial_perm: Permanence,
    /// Potential active synapses for a segment to match.
    pub min_threshold: UInt,
    /// Synapses grown per learning step.
    pub new_synapse_count: UInt,
    /// Permanence gained by synapses from previously active cells.
    pub permanence_inc: Permanence,
    /// Permanence lost by the other synapses of a learning segment.
    pub permanence_dec: Permanence,
    /// Permanence lost by segments that predicted wrongly.
    pub predicted_segment_decrement: Permanence,
    /// Segment cap per cell.
    pub max_segments_per_cell: UInt,
    /// Synapse cap per segment.
    pub max_synapses_per_segment: UInt,
}

/// Likelihood section, `anomaly.likelihood`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct LikelihoodConfig {
    /// Share of a stream used as probationary period.
    pub probationary_pct: f64,
    /// Observations between two refits of the distribution.
    pub reestimation_period: usize,
    /// Floor of the tail probability. Defaults to 1e-10.
    #[cfg_attr(feature = "serde", serde(default = "default_epsilon"))]
    pub epsilon: f64,
    /// When false the raw score is reported as the anomaly score. Defaults to true.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub enabled: bool,
}

/// Anomaly section, `anomaly`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct AnomalyConfig {
    /// The likelihood estimator.
    pub likelihood: LikelihoodConfig,
}

/// Complete parameter set of an HTM detector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", deny_unknown_fields))]
pub struct DetectorConfig {
    /// Encoders.
    pub enc: EncoderConfig,
    /// Spatial pooler.
    pub sp: SpConfig,
    /// Temporal memory.
    pub tm: TmConfig,
    /// Anomaly scoring.
    pub anomaly: AnomalyConfig,
    /// Seed of every random choice the detector makes. Defaults to 0.
    #[cfg_attr(feature = "serde", serde(default))]
    pub seed: u64,
}

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}

#[cfg(feature = "serde")]
fn default_duty_cycle_period() -> UInt {
    1000
}

#[cfg(feature = "serde")]
fn default_min_pct_overlap_duty_cycle() -> Real {
    0.001
}

#[cfg(feature = "serde")]
fn default_epsilon() -> f64 {
    1e-10
}

impl Default for DetectorConfig {
    /// The parameter set tuned for comparison with the reference NAB detectors.
    fn default() -> Self {
        Self {
            enc: EncoderConfig {
                value: ValueEncoderConfig {
                    size: 4000,
                    sparsity: 0.10,
                    resolution: Some(0.001),
                    seed: None,
                },
                time: DateEncoderParams::default(),
                integer_time: None,
            },
            sp: SpConfig {
                column_count: 2048,
                potential_pct: 0.4,
                potential_radius: None,
                local_area_density: 40.0 / 2048.0,
                stimulus_threshold: 0,
                syn_perm_active_inc: 0.003,
                syn_perm_inactive_dec: 0.0005,
                syn_perm_connected: 0.2,
                boost_strength: 0.0,
                wrap_around: true,
                global_inhibition: true,
                duty_cycle_period: 1000,
                min_pct_overlap_duty_cycle: 0.001,
            },
            tm: TmConfig {
                cells_per_column: 32,
                activation_threshold: 13,
                initial_perm: 0.21,
                min_threshold: 10,
                new_synapse_count: 20,
                permanence_inc: 0.1,
                permanence_dec: 0.1,
                predicted_segment_decrement: 0.0,
                max_segments_per_cell: 128,
                max_synapses_per_segment: 32,
            },
            anomaly: AnomalyConfig {
                likelihood: LikelihoodConfig {
                    probationary_pct: 0.1,
                    reestimation_period: 1,
                    epsilon: 1e-10,
                    enabled: true,
                },
            },
            seed: 0,
        }
    }
}

impl DetectorConfig {
    /// Parses a configuration from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`HtmError::Serialization`] for malformed JSON,
    /// [`HtmError::InvalidConfig`] for missing, unknown or mistyped keys and
    /// a configuration error for invalid values.
    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|err| {
            if err.classify() == serde_json::error::Category::Data {
                HtmError::InvalidConfig(err.to_string())
            } else {
                HtmError::Serialization(err)
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// As [`DetectorConfig::from_json_str`], plus [`HtmError::Io`].
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serializes the configuration in its parameter-file form.
    ///
    /// # Errors
    ///
    /// Returns [`HtmError::Serialization`] if serialization fails.
    #[cfg(feature = "serde")]
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every field and every cross-field constraint.
    ///
    /// Stream-dependent values (the derived resolution and the encoding
    /// width) are checked again when a detector is built.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self) -> Result<()> {
        Rdse::new(self.value_encoder_params(self.enc.value.resolution.unwrap_or(1.0)))?;
        match self.time_encoding() {
            TimeEncoding::Calendar(params) => {
                DateEncoder::new(params)?;
            }
            TimeEncoding::UnixSeconds(params) => {
                Rdse::new(params)?;
            }
        }

        self.sp_params(1).validate()?;
        self.tm_params().validate()?;

        let likelihood = &self.anomaly.likelihood;
        if !(0.0..=1.0).contains(&likelihood.probationary_pct) {
            return Err(HtmError::InvalidParameter {
                name: "probationaryPct",
                message: format!("Must be in range [0, 1], got {}", likelihood.probationary_pct),
            });
        }
        self.likelihood_params(0).validate()?;

        Ok(())
    }

    /// The value encoder parameters for a given resolution.
    pub fn value_encoder_params(&self, resolution: f64) -> RdseParams {
        RdseParams {
            size: self.enc.value.size,
            sparsity: self.enc.value.sparsity,
            resolution,
            seed: self.enc.value.seed.unwrap_or(self.seed),
        }
    }

    /// How timestamps are encoded.
    pub fn time_encoding(&self) -> TimeEncoding {
        match &self.enc.integer_time {
            Some(params) => TimeEncoding::UnixSeconds(params.clone()),
            None => TimeEncoding::Calendar(self.enc.time.clone()),
        }
    }

    /// Spatial pooler parameters for an encoding of `num_inputs` bits.
    pub fn sp_params(&self, num_inputs: UInt) -> SpatialPoolerParams {
        let sp = &self.sp;
        SpatialPoolerParams {
            num_inputs,
            num_columns: sp.column_count,
            potential_radius: sp.potential_radius,
            potential_pct: sp.potential_pct,
            global_inhibition: sp.global_inhibition,
            local_area_density: sp.local_area_density,
            stimulus_threshold: sp.stimulus_threshold,
            syn_perm_inactive_dec: sp.syn_perm_inactive_dec,
            syn_perm_active_inc: sp.syn_perm_active_inc,
            syn_perm_connected: sp.syn_perm_connected,
            min_pct_overlap_duty_cycles: sp.min_pct_overlap_duty_cycle,
            duty_cycle_period: sp.duty_cycle_period,
            boost_strength: sp.boost_strength,
            seed: self.seed,
            wrap_around: sp.wrap_around,
        }
    }

    /// Temporal memory parameters.
    pub fn tm_params(&self) -> TemporalMemoryParams {
        let tm = &self.tm;
        TemporalMemoryParams {
            num_columns: self.sp.column_count,
            cells_per_column: tm.cells_per_column,
            activation_threshold: tm.activation_threshold,
            initial_permanence: tm.initial_perm,
            connected_permanence: self.sp.syn_perm_connected,
            min_threshold: tm.min_threshold,
            max_synapses_per_segment: tm.max_synapses_per_segment,
            max_segments_per_cell: tm.max_segments_per_cell,
            max_new_synapse_count: tm.new_synapse_count,
            permanence_increment: tm.permanence_inc,
            permanence_decrement: tm.permanence_dec,
            predicted_segment_decrement: tm.predicted_segment_decrement,
            seed: self.seed,
        }
    }

    /// Likelihood parameters for a stream with the given probationary period.
    pub fn likelihood_params(&self, probationary_period: usize) -> AnomalyLikelihoodParams {
        AnomalyLikelihoodParams {
            epsilon: self.anomaly.likelihood.epsilon,
            ..AnomalyLikelihoodParams::from_probationary_period(
                probationary_period,
                self.anomaly.likelihood.reestimation_period,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        DetectorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_active_bits_rejected() {
        let mut config = DetectorConfig::default();
        config.enc.value.size = 5;
        config.enc.value.sparsity = 0.05;
        assert!(config.validate().unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_non_positive_resolution_rejected() {
        let mut config = DetectorConfig::default();
        config.enc.value.resolution = Some(0.0);
        assert!(config.validate().is_err());

        config.enc.value.resolution = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cross_field_constraints() {
        let mut config = DetectorConfig::default();
        config.tm.min_threshold = config.tm.new_synapse_count + 1;
        assert!(matches!(
            config.validate(),
            Err(HtmError::IncompatibleParameters(_))
        ));

        let mut config = DetectorConfig::default();
        config.tm.new_synapse_count = config.tm.max_synapses_per_segment + 1;
        assert!(matches!(
            config.validate(),
            Err(HtmError::IncompatibleParameters(_))
        ));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut config = DetectorConfig::default();
        config.sp.local_area_density = 0.9;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.anomaly.likelihood.reestimation_period = 0;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.anomaly.likelihood.probationary_pct = 1.5;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.tm.cells_per_column = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_time_encoding_selection() {
        let mut config = DetectorConfig::default();
        assert!(matches!(config.time_encoding(), TimeEncoding::Calendar(_)));

        config.enc.integer_time = Some(RdseParams::default());
        assert!(matches!(config.time_encoding(), TimeEncoding::UnixSeconds(_)));
    }

    #[test]
    fn test_seed_fallback() {
        let mut config = DetectorConfig::default();
        config.seed = 17;
        assert_eq!(config.value_encoder_params(1.0).seed, 17);
        assert_eq!(config.sp_params(10).seed, 17);

        config.enc.value.seed = Some(3);
        assert_eq!(config.value_encoder_params(1.0).seed, 3);
    }

    #[test]
    fn test_stream_profile() {
        let profile = StreamProfile::for_stream_length(0.0, 13.0, 1000, 0.1);
        assert_eq!(profile.probationary_period, 100);
        assert!((profile.default_resolution() - 0.1).abs() < 1e-12);

        let tiny = StreamProfile::new(5.0, 5.0, 10);
        assert_eq!(tiny.default_resolution(), 0.001);
        assert!(tiny.validate().is_ok());

        assert!(StreamProfile::new(1.0, 0.0, 10).validate().is_err());
        assert!(StreamProfile::new(f64::NAN, 0.0, 10).validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_round_trip() {
        let config = DetectorConfig::default();
        let json = config.to_json_string().unwrap();
        assert_eq!(DetectorConfig::from_json_str(&json).unwrap(), config);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_defaults_and_rejections() {
        let json = r#"{
            "enc": {
                "value": { "size": 400, "sparsity": 0.1 },
                "time": { "timeOfDay": [21, 9.49], "dayOfWeek": 0, "season": [0, 91.5], "weekend": 0 }
            },
            "sp": {
                "columnCount": 512, "potentialPct": 0.8, "localAreaDensity": 0.04,
                "synPermActiveInc": 0.003, "synPermInactiveDec": 0.0005, "synPermConnected": 0.2,
                "boostStrength": 0.0, "wrapAround": true
            },
            "tm": {
                "cellsPerColumn": 8, "activationThreshold": 13, "initialPerm": 0.21, "minThreshold": 10,
                "newSynapseCount": 20, "permanenceInc": 0.1, "permanenceDec": 0.1,
                "predictedSegmentDecrement": 0.0, "maxSegmentsPerCell": 64, "maxSynapsesPerSegment": 32
            },
            "anomaly": { "likelihood": { "probationaryPct": 0.1, "reestimationPeriod": 100 } }
        }"#;

        let config = DetectorConfig::from_json_str(json).unwrap();
        assert_eq!(config.enc.value.resolution, None);
        assert_eq!(config.sp.potential_radius, None);
        assert!(config.sp.global_inhibition);
        assert_eq!(config.sp.duty_cycle_period, 1000);
        assert!(config.anomaly.likelihood.enabled);
        assert_eq!(config.seed, 0);

        let unknown = json.replace("\"columnCount\"", "\"columnCountTypo\": 1, \"columnCount\"");
        let err = DetectorConfig::from_json_str(&unknown).unwrap_err();
        assert!(matches!(err, HtmError::InvalidConfig(_)));
        assert!(err.is_configuration_error());

        let missing = json.replace("\"cellsPerColumn\": 8, ", "");
        let err = DetectorConfig::from_json_str(&missing).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("cellsPerColumn"));

        let mistyped = json.replace("\"wrapAround\": true", "\"wrapAround\": \"yes\"");
        assert!(DetectorConfig::from_json_str(&mistyped)
            .unwrap_err()
            .is_configuration_error());

        let truncated = &json[..json.len() / 2];
        assert!(matches!(
            DetectorConfig::from_json_str(truncated),
            Err(HtmError::Serialization(_))
        ));

        let invalid = json.replace("\"potentialPct\": 0.8", "\"potentialPct\": 0.0");
        assert!(matches!(
            DetectorConfig::from_json_str(&invalid),
            Err(HtmError::InvalidParameter { .. })
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("params.json");
        std::fs::write(&path, DetectorConfig::default().to_json_string().unwrap()).unwrap();

        let loaded = DetectorConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, DetectorConfig::default());

        assert!(matches!(
            DetectorConfig::from_json_file(temp_dir.path().join("missing.json")),
            Err(HtmError::Io(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_missing_section_is_configuration_error() {
        let mut value: serde_json::Value =
            serde_json::from_str(&DetectorConfig::default().to_json_string().unwrap()).unwrap();
        value["tm"].as_object_mut().unwrap().remove("cellsPerColumn");

        let err = DetectorConfig::from_json_str(&value.to_string()).unwrap_err();
        assert!(err.is_configuration_error(), "{err:?}");
    }

    #[test]
    fn test_default_refits_every_step() {
        let config = DetectorConfig::default();
        assert_eq!(config.anomaly.likelihood.reestimation_period, 1);
        assert_eq!(config.likelihood_params(100).reestimation_period, 1);
    }
}
