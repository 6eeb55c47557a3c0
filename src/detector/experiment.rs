//! Hyperparameter experiments against an external benchmark.
//!
//! An [`ExperimentRunner`] turns a configuration into a single benchmark
//! score, higher is better. [`CommandRunner`] does so by writing the
//! configuration as a parameter file, running an external command and
//! reading the score back from the results file it produces.

use super::DetectorConfig;
use crate::error::{HtmError, Result};

use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// Scores a detector configuration.
pub trait ExperimentRunner {
    /// Runs one experiment and returns its score.
    ///
    /// # Errors
    ///
    /// Returns an error if the experiment could not be run or produced no
    /// score.
    fn evaluate(&mut self, config: &DetectorConfig) -> Result<f64>;
}

/// Runs an external benchmark command per experiment.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::detector::CommandRunner;
///
/// let runner = CommandRunner::new("python")
///     .args(["./run.py", "-d", "htmcore", "--skipConfirmation", "--detect", "--optimize", "--score", "--normalize"])
///     .working_dir("./NAB")
///     .params_path("./NAB/nab/detectors/htmcore/params.json")
///     .results_path("./NAB/results/final_results.json");
/// assert_eq!(runner.score_pointer(), "/htmcore/standard");
/// ```
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    params_path: PathBuf,
    results_path: PathBuf,
    score_pointer: String,
}

impl CommandRunner {
    /// Creates a runner for `program`, run in the current directory with
    /// `params.json` and `final_results.json` as file locations.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            params_path: PathBuf::from("params.json"),
            results_path: PathBuf::from("final_results.json"),
            score_pointer: "/htmcore/standard".to_string(),
        }
    }

    /// Sets the command arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the directory the command runs in.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Sets where the configuration is written.
    #[must_use]
    pub fn params_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.params_path = path.into();
        self
    }

    /// Sets where the results are read from.
    #[must_use]
    pub fn results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = path.into();
        self
    }

    /// Sets the JSON pointer locating the score in the results file.
    #[must_use]
    pub fn with_score_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.score_pointer = pointer.into();
        self
    }

    /// The JSON pointer locating the score.
    pub fn score_pointer(&self) -> &str {
        &self.score_pointer
    }

    fn write_params(&self, config: &DetectorConfig) -> Result<()> {
        if let Some(parent) = self.params_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.params_path, config.to_json_string()?)?;
        Ok(())
    }

    fn read_score(&self) -> Result<f64> {
        let results = std::fs::read_to_string(&self.results_path)?;
        let results: serde_json::Value = serde_json::from_str(&results)?;
        results
            .pointer(&self.score_pointer)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| {
                HtmError::Experiment(format!(
                    "no numeric score at '{}' in {}",
                    self.score_pointer,
                    self.results_path.display()
                ))
            })
    }
}

impl ExperimentRunner for CommandRunner {
    fn evaluate(&mut self, config: &DetectorConfig) -> Result<f64> {
        config.validate()?;
        self.write_params(config)?;

        info!(program = %self.program, params = %self.params_path.display(), "Starting experiment");
        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .status()?;
        if !status.success() {
            return Err(HtmError::Experiment(format!(
                "'{}' exited with {status}",
                self.program
            )));
        }

        let score = self.read_score()?;
        info!(score, "Experiment finished");
        Ok(score)
    }
}

/// Probes one parameter over candidate values and returns the best
/// `(value, score)` pair. Ties keep the earlier candidate.
///
/// `apply` writes a candidate value into a copy of `base`.
///
/// # Errors
///
/// Returns [`HtmError::InvalidParameter`] for an empty candidate list and
/// the first error raised by an experiment.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::detector::{grid_search, DetectorConfig, ExperimentRunner};
///
/// struct Peak;
///
/// impl ExperimentRunner for Peak {
///     fn evaluate(&mut self, config: &DetectorConfig) -> htm_anomaly::Result<f64> {
///         Ok(-(f64::from(config.sp.local_area_density) - 0.05).abs())
///     }
/// }
///
/// let (best, _) = grid_search(&mut Peak, &DetectorConfig::default(), &[0.02, 0.05, 0.1], |config, v| {
///     config.sp.local_area_density = v as f32;
/// }).unwrap();
/// assert_eq!(best, 0.05);
/// ```
pub fn grid_search<R, F>(
    runner: &mut R,
    base: &DetectorConfig,
    values: &[f64],
    mut apply: F,
) -> Result<(f64, f64)>
where
    R: ExperimentRunner + ?Sized,
    F: FnMut(&mut DetectorConfig, f64),
{
    let mut best: Option<(f64, f64)> = None;

    for &value in values {
        let mut config = base.clone();
        apply(&mut config, value);

        let score = runner.evaluate(&config)?;
        info!(value, score, "Grid point evaluated");

        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((value, score));
        }
    }

    best.ok_or(HtmError::InvalidParameter {
        name: "values",
        message: "Grid search needs at least one candidate".to_string(),
    })
}
