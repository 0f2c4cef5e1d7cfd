//! Per-batch signal conditioning: detrending, trailing rolling statistics and
//! removal of rows whose rolling window is incomplete.
//!
//! Every step is local to the batch it is given. Trends are re-estimated and the
//! rolling window restarts at each batch boundary, so the first `window_size - 1`
//! rows of every batch are always dropped and detrended values can jump between
//! consecutive batches. This is a known limitation of the streaming design.

use crate::data::{Batch, FeatureRow, Reading, CHANNEL_COUNT};
use crate::error::{PipelineError, Result};
use crate::utils::stats::{self, RollingWindow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Trend removed from each channel before rolling statistics are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetrendOrder {
    /// Subtract the batch mean.
    Constant,
    /// Subtract the least-squares line over the batch.
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Rolling window length in seconds.
    pub window_seconds: f64,
    /// Nominal spacing between consecutive readings (50 Hz sensors).
    pub sample_step_seconds: f64,
    pub detrend_order: DetrendOrder,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        PreprocessConfig {
            window_seconds: 0.5,
            sample_step_seconds: 0.02,
            detrend_order: DetrendOrder::Linear,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "window_seconds must be positive, got {}",
                self.window_seconds
            )));
        }
        if !(self.sample_step_seconds.is_finite() && self.sample_step_seconds > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "sample_step_seconds must be positive, got {}",
                self.sample_step_seconds
            )));
        }
        Ok(())
    }
}

/// Trailing statistics of one row, per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    pub mean: [f64; CHANNEL_COUNT],
    pub std: [f64; CHANNEL_COUNT],
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Preprocessor { config })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Rows per rolling window for the configured window length.
    pub fn window_size(&self) -> usize {
        self.window_size_for(self.config.window_seconds)
    }

    fn window_size_for(&self, window_seconds: f64) -> usize {
        ((window_seconds / self.config.sample_step_seconds).round_ties_even() as usize).max(1)
    }

    /// Copy of `batch` with every channel detrended over exactly this batch.
    /// Timestamps and labels are carried over unchanged.
    pub fn detrend(&self, batch: &Batch) -> Batch {
        let order = self.config.detrend_order;
        let columns: Vec<Vec<f64>> = (0..CHANNEL_COUNT)
            .into_par_iter()
            .map(|c| detrend_column(&batch.column(c), order))
            .collect();

        let readings = batch
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut values = [0.0; CHANNEL_COUNT];
                for (c, column) in columns.iter().enumerate() {
                    values[c] = column[i];
                }
                Reading { values, ..*r }
            })
            .collect();
        Batch::new(readings)
    }

    /// Trailing rolling mean and population std per channel over
    /// `round(window_seconds / sample_step_seconds)` rows, halves rounding to even. Rows before the
    /// window fills are `None`.
    pub fn rolling_features(&self, batch: &Batch, window_seconds: f64) -> Vec<Option<RollingStats>> {
        let window = self.window_size_for(window_seconds);
        let per_channel: Vec<Vec<Option<(f64, f64)>>> = (0..CHANNEL_COUNT)
            .into_par_iter()
            .map(|c| {
                let mut w = RollingWindow::new(window);
                batch.iter().map(|r| w.push(r.values[c])).collect()
            })
            .collect();

        (0..batch.len())
            .map(|i| {
                let mut out = RollingStats {
                    mean: [0.0; CHANNEL_COUNT],
                    std: [0.0; CHANNEL_COUNT],
                };
                for (c, column) in per_channel.iter().enumerate() {
                    let (m, s) = column[i]?;
                    out.mean[c] = m;
                    out.std[c] = s;
                }
                Some(out)
            })
            .collect()
    }

    /// Detrend, add rolling features and keep only rows with a complete window.
    ///
    /// A row whose detrended value or rolling statistics are not finite counts
    /// as incomplete, so a `NaN` reading drops itself and every row whose window
    /// covers it. For finite input this yields `batch.len() - (window_size - 1)`
    /// rows, or none when the batch is shorter than the window. The input batch
    /// is left untouched.
    pub fn preprocess(&self, batch: &Batch) -> Vec<FeatureRow> {
        if batch.len() < self.window_size() {
            return Vec::new();
        }
        let detrended = self.detrend(batch);
        let rolling = self.rolling_features(&detrended, self.config.window_seconds);

        batch
            .iter()
            .zip(detrended.iter())
            .zip(rolling)
            .filter_map(|((raw, clean), stats)| {
                let s = stats?;
                let complete = clean
                    .values
                    .iter()
                    .chain(&s.mean)
                    .chain(&s.std)
                    .all(|v| v.is_finite());
                complete.then(|| FeatureRow {
                    reading: *raw,
                    detrended: clean.values,
                    roll_mean: s.mean,
                    roll_std: s.std,
                })
            })
            .collect()
    }

    /// Preprocess several batches independently and concatenate the rows.
    pub fn preprocess_all<'a, I>(&self, batches: I) -> Vec<FeatureRow>
    where
        I: IntoIterator<Item = &'a Batch>,
    {
        batches.into_iter().flat_map(|b| self.preprocess(b)).collect()
    }
}

fn detrend_column(ys: &[f64], order: DetrendOrder) -> Vec<f64> {
    match order {
        DetrendOrder::Constant => {
            let m = stats::finite_mean(ys);
            ys.iter().map(|y| y - m).collect()
        }
        DetrendOrder::Linear => {
            let (slope, intercept) = stats::linear_fit(ys);
            ys.iter()
                .enumerate()
                .map(|(i, y)| y - (slope * i as f64 + intercept))
                .collect()
        }
    }
}
