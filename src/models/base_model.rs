use crate::data::{FeatureRow, CHANNEL_COUNT};
use crate::error::Result;
use crate::models::model_detector::ModelDetector;
use crate::models::threshold::ThresholdDetector;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A common contract for batch anomaly detectors.
pub trait Detector: Send + Sync {
    /// Train on reference rows. Detectors without state treat this as a no-op.
    fn fit(&mut self, rows: &[FeatureRow]) -> Result<()>;

    /// One flag per row, in input order. `true` marks an anomaly.
    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<bool>>;

    fn name(&self) -> &'static str;
}

/// Columns handed to a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSet {
    /// The seven detrended channel values.
    #[default]
    Channels,
    /// Detrended values followed by every rolling mean and rolling std.
    ChannelsWithRolling,
}

impl FeatureSet {
    pub fn width(self) -> usize {
        match self {
            FeatureSet::Channels => CHANNEL_COUNT,
            FeatureSet::ChannelsWithRolling => CHANNEL_COUNT * 3,
        }
    }

    /// Row-major feature matrix, one row per feature row.
    pub fn matrix(self, rows: &[FeatureRow]) -> Array2<f64> {
        Array2::from_shape_fn((rows.len(), self.width()), |(i, j)| {
            let row = &rows[i];
            let c = j % CHANNEL_COUNT;
            match j / CHANNEL_COUNT {
                0 => row.detrended[c],
                1 => row.roll_mean[c],
                _ => row.roll_std[c],
            }
        })
    }
}

/// Detector implementations selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Threshold,
    Model,
}

/// Tagged union over the available detectors.
#[derive(Debug, Clone)]
pub enum AnyDetector {
    Threshold(ThresholdDetector),
    Model(ModelDetector),
}

impl Detector for AnyDetector {
    fn fit(&mut self, rows: &[FeatureRow]) -> Result<()> {
        match self {
            AnyDetector::Threshold(d) => d.fit(rows),
            AnyDetector::Model(d) => d.fit(rows),
        }
    }

    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<bool>> {
        match self {
            AnyDetector::Threshold(d) => d.predict(rows),
            AnyDetector::Model(d) => d.predict(rows),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AnyDetector::Threshold(d) => d.name(),
            AnyDetector::Model(d) => d.name(),
        }
    }
}

impl From<ThresholdDetector> for AnyDetector {
    fn from(d: ThresholdDetector) -> Self {
        AnyDetector::Threshold(d)
    }
}

impl From<ModelDetector> for AnyDetector {
    fn from(d: ModelDetector) -> Self {
        AnyDetector::Model(d)
    }
}
