//! Raw anomaly score.
//!
//! The raw score measures prediction error at one step: the fraction of
//! active columns that held no predicted cell.

use crate::types::{Score, Sdr};

/// Computes raw anomaly scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anomaly;

impl Anomaly {
    /// Computes the anomaly score.
    ///
    /// # Arguments
    ///
    /// * `active` - The active columns
    /// * `predicted` - The columns predicted on the previous step
    ///
    /// # Returns
    ///
    /// Anomaly score between 0.0 (fully predicted) and 1.0 (fully anomalous).
    /// An empty active set scores 0.0.
    ///
    /// # Example
    ///
    /// ```rust
    /// use htm_anomaly::algorithms::Anomaly;
    /// use htm_anomaly::types::Sdr;
    ///
    /// let active = Sdr::from_sparse(10, vec![1, 2, 3, 4]).unwrap();
    /// let predicted = Sdr::from_sparse(10, vec![1, 2, 9]).unwrap();
    /// assert_eq!(Anomaly::compute(&active, &predicted), 0.5);
    /// ```
    pub fn compute(active: &Sdr, predicted: &Sdr) -> Score {
        let num_active = active.get_sum();
        if num_active == 0 {
            return 0.0;
        }

        let num_predicted_active = active.get_overlap(predicted);
        let unpredicted = num_active - num_predicted_active;

        unpredicted as Score / num_active as Score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdr(bits: &[u32]) -> Sdr {
        Sdr::from_sparse(10, bits.to_vec()).unwrap()
    }

    #[test]
    fn test_anomaly_basic() {
        let active = sdr(&[1, 2, 3]);

        assert_eq!(Anomaly::compute(&active, &sdr(&[1, 2, 3])), 0.0);
        assert_eq!(Anomaly::compute(&active, &sdr(&[4, 5, 6])), 1.0);

        let score = Anomaly::compute(&active, &sdr(&[1, 4, 5]));
        assert!((score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_anomaly_empty() {
        assert_eq!(Anomaly::compute(&sdr(&[]), &sdr(&[1, 2])), 0.0);
        assert_eq!(Anomaly::compute(&sdr(&[3]), &sdr(&[])), 1.0);
    }

    #[test]
    fn test_extra_predictions_do_not_lower_score() {
        // Predicting more than what became active is not penalized
        let score = Anomaly::compute(&sdr(&[1, 2]), &sdr(&[0, 1, 2, 3, 4, 5]));
        assert_eq!(score, 0.0);
    }
}
