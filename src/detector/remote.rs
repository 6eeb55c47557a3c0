//! HTTP-forwarding detector.
//!
//! Protocol, JSON bodies in both directions:
//!
//! - `POST {base}/api/init` with `{inputMin, inputMax, probationaryPeriod}`
//! - `POST {base}/api/handleRecord` with `{timestamp, value}`, where the
//!   timestamp is unix seconds (UTC), answered by `{anomalyScore, rawScore}`

use super::{AnomalyDetector, AnomalyScores, StreamProfile};
use crate::error::{HtmError, Result};

use chrono::NaiveDateTime;
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RecordRequest {
    timestamp: f64,
    value: f64,
}

/// A detector hosted by an HTTP service.
///
/// Every call blocks until the service answers. Failed requests are not
/// retried.
#[derive(Debug)]
pub struct RemoteDetector {
    client: Client,
    base_url: String,
}

impl RemoteDetector {
    /// Connects to the service and initializes it for one stream.
    ///
    /// # Errors
    ///
    /// Returns [`HtmError::Remote`] if the service is unreachable or answers
    /// with an error status.
    pub fn connect(base_url: &str, profile: &StreamProfile) -> Result<Self> {
        profile.validate()?;

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();

        client
            .post(format!("{base_url}/api/init"))
            .json(profile)
            .send()?
            .error_for_status()?;

        info!(
            url = %base_url,
            probationary_period = profile.probationary_period,
            "Remote detector initialized"
        );

        Ok(Self { client, base_url })
    }

    /// The service base URL, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl AnomalyDetector for RemoteDetector {
    fn process(&mut self, timestamp: NaiveDateTime, value: f64) -> Result<AnomalyScores> {
        if !value.is_finite() {
            warn!(%timestamp, value, "Rejected non-finite value");
            return Err(HtmError::InvalidInput(format!(
                "value at {timestamp} is not finite: {value}"
            )));
        }

        let request = RecordRequest {
            timestamp: timestamp.and_utc().timestamp() as f64,
            value,
        };
        let scores: AnomalyScores = self
            .client
            .post(format!("{}/api/handleRecord", self.base_url))
            .json(&request)
            .send()?
            .error_for_status()?
            .json()?;

        debug!(%timestamp, value, raw_score = scores.raw_score, "Remote scores received");
        Ok(scores)
    }
}
