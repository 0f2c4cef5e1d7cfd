use crate::data::FeatureRow;
use crate::error::{PipelineError, Result};
use crate::models::base_model::{Detector, FeatureSet};
use ndarray::{ArrayView2, Axis};

/// Flags a row when *any* detrended channel sits more than `threshold_sigma`
/// population standard deviations away from the mean of the rows being scored.
///
/// The statistics come from the rows passed to `predict`, not from a reference
/// set, so no training is needed.
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    threshold_sigma: f64,
}

impl ThresholdDetector {
    pub const DEFAULT_SIGMA: f64 = 3.5;

    pub fn new(threshold_sigma: f64) -> Result<Self> {
        if !(threshold_sigma.is_finite() && threshold_sigma > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold_sigma must be positive, got {threshold_sigma}"
            )));
        }
        Ok(ThresholdDetector { threshold_sigma })
    }

    pub fn threshold_sigma(&self) -> f64 {
        self.threshold_sigma
    }

    /// Score a raw matrix (rows x features) with the same rule.
    pub fn predict_matrix(&self, x: ArrayView2<'_, f64>) -> Vec<bool> {
        let Some(means) = x.mean_axis(Axis(0)) else {
            return Vec::new();
        };
        let stds = x.std_axis(Axis(0), 0.0);

        x.axis_iter(Axis(0))
            .map(|row| {
                row.iter().zip(means.iter()).zip(stds.iter()).any(|((&v, &m), &s)| {
                    // zero-variance channels never exceed
                    if !(s.is_finite() && s > 0.0) {
                        return false;
                    }
                    ((v - m) / s).abs() > self.threshold_sigma
                })
            })
            .collect()
    }
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        ThresholdDetector { threshold_sigma: Self::DEFAULT_SIGMA }
    }
}

impl Detector for ThresholdDetector {
    fn fit(&mut self, _rows: &[FeatureRow]) -> Result<()> {
        Ok(())
    }

    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<bool>> {
        let x = FeatureSet::Channels.matrix(rows);
        Ok(self.predict_matrix(x.view()))
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Reading, CHANNEL_COUNT};

    fn rows(values: &[[f64; CHANNEL_COUNT]]) -> Vec<FeatureRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| FeatureRow {
                reading: Reading::new(i as f64 * 0.02, *v),
                detrended: *v,
                roll_mean: [0.0; CHANNEL_COUNT],
                roll_std: [0.0; CHANNEL_COUNT],
            })
            .collect()
    }

    #[test]
    fn one_flag_per_row() {
        let det = ThresholdDetector::new(3.0).unwrap();
        let data: Vec<[f64; CHANNEL_COUNT]> =
            (0..57).map(|i| [(i as f64).sin(), 0.0, 1.0, 2.0, (i as f64).cos(), 0.0, 1.0]).collect();
        assert_eq!(det.predict(&rows(&data)).unwrap().len(), 57);
        assert!(det.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn flags_single_spike() {
        let mut data: Vec<[f64; CHANNEL_COUNT]> =
            (0..200).map(|i| [((i % 7) as f64) * 0.01, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]).collect();
        data[120][0] = 5.0;
        let flags = ThresholdDetector::new(3.0).unwrap().predict(&rows(&data)).unwrap();
        assert!(flags[120]);
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
    }

    #[test]
    fn constant_channel_never_flags() {
        let data = vec![[2.5; CHANNEL_COUNT]; 40];
        let flags = ThresholdDetector::new(0.1).unwrap().predict(&rows(&data)).unwrap();
        assert!(flags.iter().all(|f| !f));
    }

    #[test]
    fn fit_is_a_no_op() {
        let mut det = ThresholdDetector::default();
        let data = vec![[1.0; CHANNEL_COUNT]; 5];
        det.fit(&rows(&data)).unwrap();
        assert_eq!(det.threshold_sigma(), 3.5);
    }

    #[test]
    fn rejects_bad_sigma() {
        assert!(ThresholdDetector::new(0.0).is_err());
        assert!(ThresholdDetector::new(f64::NAN).is_err());
    }
}
