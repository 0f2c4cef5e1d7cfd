use crate::data::reading::{Reading, CHANNEL_COUNT};

/// A reading enriched with its detrended channel values and the trailing
/// rolling mean / population standard deviation of those values.
///
/// Rows are only built once the full rolling window is available and every
/// value in it is finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub reading: Reading,
    pub detrended: [f64; CHANNEL_COUNT],
    pub roll_mean: [f64; CHANNEL_COUNT],
    pub roll_std: [f64; CHANNEL_COUNT],
}

impl FeatureRow {
    pub fn timestamp(&self) -> f64 {
        self.reading.timestamp
    }
}
