//! Anomaly likelihood.
//!
//! Raw anomaly scores are noisy: a stream that is never well predicted scores
//! high all the time. The likelihood estimator keeps a rolling window of
//! recent raw scores, fits a normal distribution to it and reports how far in
//! the upper tail the current raw score lies.
//!
//! The first `learning_period + estimation_samples` observations are
//! probationary. They only fill the window, which holds the most recent
//! `estimation_samples` raw scores. After that the distribution is refit every
//! `reestimation_period` observations, always from the window as it stood
//! before the score being judged.

use std::collections::VecDeque;

use crate::error::{HtmError, Result};
use crate::types::Score;

use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for the anomaly likelihood estimator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnomalyLikelihoodParams {
    /// Leading observations whose raw scores are never fitted.
    pub learning_period: usize,

    /// Size of the rolling window the distribution is fitted to.
    pub estimation_samples: usize,

    /// Observations between two refits of the distribution.
    pub reestimation_period: usize,

    /// Floor of the tail probability.
    pub epsilon: f64,
}

impl Default for AnomalyLikelihoodParams {
    fn default() -> Self {
        Self {
            learning_period: 288,
            estimation_samples: 100,
            reestimation_period: 100,
            epsilon: 1e-10,
        }
    }
}

impl AnomalyLikelihoodParams {
    /// Splits a probationary period into a learning half and an estimation half.
    ///
    /// The estimation half always keeps at least one sample.
    ///
    /// # Example
    ///
    /// ```rust
    /// use htm_anomaly::algorithms::AnomalyLikelihoodParams;
    ///
    /// let params = AnomalyLikelihoodParams::from_probationary_period(151, 100);
    /// assert_eq!(params.learning_period, 75);
    /// assert_eq!(params.estimation_samples, 76);
    /// ```
    pub fn from_probationary_period(probationary_period: usize, reestimation_period: usize) -> Self {
        let learning_period = probationary_period / 2;
        Self {
            learning_period,
            estimation_samples: (probationary_period - learning_period).max(1),
            reestimation_period,
            ..Default::default()
        }
    }

    /// Checks every parameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.estimation_samples == 0 {
            return Err(HtmError::InvalidParameter {
                name: "estimation_samples",
                message: "Must be > 0".to_string(),
            });
        }
        if self.reestimation_period == 0 {
            return Err(HtmError::InvalidParameter {
                name: "reestimation_period",
                message: "Must be > 0".to_string(),
            });
        }
        if !(self.epsilon > 0.0 && self.epsilon < 0.5) {
            return Err(HtmError::InvalidParameter {
                name: "epsilon",
                message: format!("Must be in range (0, 0.5), got {}", self.epsilon),
            });
        }
        Ok(())
    }
}

/// A fitted normal distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    /// Mean of the fitted window.
    pub mean: f64,
    /// Population standard deviation of the fitted window.
    pub std_dev: f64,
}

/// Standard deviations below this are treated as a constant window.
const MIN_STD_DEV: f64 = 1e-6;

/// Computes anomaly likelihood based on historical anomaly scores.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::algorithms::{AnomalyLikelihood, AnomalyLikelihoodParams};
///
/// let mut likelihood = AnomalyLikelihood::new(AnomalyLikelihoodParams {
///     learning_period: 0,
///     estimation_samples: 4,
///     reestimation_period: 10,
///     epsilon: 1e-10,
/// }).unwrap();
///
/// for raw in [0.1, 0.3, 0.1, 0.3] {
///     assert_eq!(likelihood.log_anomaly_score(raw), None);
/// }
/// let usual = likelihood.log_anomaly_score(0.2).unwrap();
/// let unusual = likelihood.log_anomaly_score(0.9).unwrap();
/// assert!(unusual > usual);
/// ```
#[derive(Debug, Clone)]
pub struct AnomalyLikelihood {
    learning_period: usize,
    estimation_samples: usize,
    reestimation_period: usize,
    epsilon: f64,

    /// Most recent raw scores, oldest first.
    window: VecDeque<Score>,

    distribution: Option<Distribution>,

    /// Observations seen so far.
    iteration: usize,
}

impl AnomalyLikelihood {
    /// Creates a new likelihood estimator.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty window, a zero refit
    /// period or an epsilon outside `(0, 0.5)`.
    pub fn new(params: AnomalyLikelihoodParams) -> Result<Self> {
        params.validate()?;

        Ok(Self {
            learning_period: params.learning_period,
            estimation_samples: params.estimation_samples,
            reestimation_period: params.reestimation_period,
            epsilon: params.epsilon,
            window: VecDeque::with_capacity(params.estimation_samples),
            distribution: None,
            iteration: 0,
        })
    }

    /// Number of leading observations for which no likelihood is produced.
    pub fn probationary_period(&self) -> usize {
        self.learning_period + self.estimation_samples
    }

    /// Returns the distribution currently used for scoring.
    pub fn distribution(&self) -> Option<Distribution> {
        self.distribution
    }

    /// Returns the number of observations seen.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Consumes one raw score and returns the likelihood that it is anomalous.
    ///
    /// The result lies in `[0, 1 - epsilon]`. Probationary observations
    /// return 0.5.
    pub fn anomaly_probability(&mut self, raw_score: Score) -> f64 {
        self.iteration += 1;

        if self.iteration <= self.probationary_period() {
            self.push(raw_score);
            return 0.5;
        }

        let since_probation = self.iteration - self.probationary_period() - 1;
        if self.distribution.is_none() || since_probation % self.reestimation_period == 0 {
            self.estimate_distribution();
        }

        let likelihood = match self.distribution {
            Some(distribution) => 1.0 - self.tail_probability(raw_score, distribution),
            None => 0.5,
        };

        self.push(raw_score);
        likelihood
    }

    /// Converts a likelihood into a log score, `-log10(1 - likelihood)`.
    ///
    /// A likelihood of 0 scores 0; the largest likelihood, `1 - epsilon`,
    /// scores `-log10(epsilon)`.
    pub fn compute_log_likelihood(&self, likelihood: f64) -> Score {
        -(1.0 - likelihood).max(self.epsilon).log10()
    }

    /// Consumes one raw score and returns its log score, or `None` while
    /// probationary.
    pub fn log_anomaly_score(&mut self, raw_score: Score) -> Option<Score> {
        let likelihood = self.anomaly_probability(raw_score);
        if self.iteration <= self.probationary_period() {
            None
        } else {
            Some(self.compute_log_likelihood(likelihood))
        }
    }

    fn push(&mut self, raw_score: Score) {
        if self.window.len() == self.estimation_samples {
            self.window.pop_front();
        }
        self.window.push_back(raw_score);
    }

    /// Fits a normal distribution to the window.
    fn estimate_distribution(&mut self) {
        if self.window.is_empty() {
            return;
        }

        let n = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let variance = self.window.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let distribution = Distribution {
            mean,
            std_dev: variance.sqrt(),
        };

        debug!(
            iteration = self.iteration,
            samples = self.window.len(),
            mean = distribution.mean,
            std_dev = distribution.std_dev,
            "refit anomaly likelihood distribution"
        );
        self.distribution = Some(distribution);
    }

    /// Upper tail probability of `raw_score`, floored at epsilon.
    fn tail_probability(&self, raw_score: Score, distribution: Distribution) -> f64 {
        if distribution.std_dev < MIN_STD_DEV {
            // A constant window: anything above the constant is as unlikely
            // as it gets, anything else is ordinary.
            return if raw_score - distribution.mean > MIN_STD_DEV {
                self.epsilon
            } else {
                1.0
            };
        }

        let z = (raw_score - distribution.mean) / distribution.std_dev;
        let tail = 0.5 * erfc(z / std::f64::consts::SQRT_2);
        tail.max(self.epsilon)
    }
}

impl Default for AnomalyLikelihood {
    fn default() -> Self {
        Self {
            learning_period: 288,
            estimation_samples: 100,
            reestimation_period: 100,
            epsilon: 1e-10,
            window: VecDeque::with_capacity(100),
            distribution: None,
            iteration: 0,
        }
    }
}

/// Complementary error function approximation.
fn erfc(x: f64) -> f64 {
    // Approximation from Abramowitz and Stegun
    let t = 1.0 / (1.0 + 0.5 * x.abs());

    let tau = t
        * (-x * x - 1.26551223
            + t * (1.00002368
                + t * (0.37409196
                    + t * (0.09678418
                        + t * (-0.18628806
                            + t * (0.27886807
                                + t * (-1.13520398
                                    + t * (1.48851587
                                        + t * (-0.82215223 + t * 0.17087277)))))))))
        .exp();

    if x >= 0.0 {
        tau
    } else {
        2.0 - tau
    }
}
