use crate::error::{PipelineError, Result};
use crate::models::base_model::DetectorKind;
use crate::models::model_detector::ModelConfig;
use crate::models::threshold::ThresholdDetector;
use crate::preprocess::PreprocessConfig;
use crate::source::SourceMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables prefixed with this (e.g. `SENSOR__BATCH_SIZE`,
/// `SENSOR__MODEL__CONTAMINATION`) override file settings.
pub const ENV_PREFIX: &str = "SENSOR";

/// Whether batches drained to train a fresh model are also scanned for anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingReuse {
    /// Training batches are consumed and never reported on; scanning starts at
    /// the first reading after them.
    #[default]
    Discard,
    /// Training batches are scanned first once the main loop starts, so every
    /// reading in the source is scanned exactly once.
    Replay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub detector: DetectorKind,
    pub threshold_sigma: f64,
    pub model: ModelConfig,
    /// Where a trained model is loaded from and saved to.
    pub model_path: Option<PathBuf>,
    /// Batches drained to build the training set when no saved model is used.
    pub train_batches: usize,
    /// Train from the source when `model_path` does not exist yet. When false a
    /// missing model file is an error.
    pub train_if_missing: bool,
    pub training_reuse: TrainingReuse,
    pub preprocess: PreprocessConfig,
    /// Delay between batches; cosmetic only.
    pub pacing_ms: u64,
    pub max_batches: Option<usize>,
    /// Empty the sink before the first batch. Destroys earlier runs' output.
    pub clear_sink: bool,
    /// Keep waiting for new readings instead of stopping at the end of the store.
    pub follow: bool,
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            batch_size: 500,
            detector: DetectorKind::Threshold,
            threshold_sigma: ThresholdDetector::DEFAULT_SIGMA,
            model: ModelConfig::default(),
            model_path: None,
            train_batches: 3,
            train_if_missing: true,
            training_reuse: TrainingReuse::Discard,
            preprocess: PreprocessConfig::default(),
            pacing_ms: 10,
            max_batches: None,
            clear_sink: true,
            follow: false,
            poll_interval_ms: 500,
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the optional file (format from its extension), then
    /// `SENSOR__*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        let cfg: PipelineConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig("batch_size must be positive".into()));
        }
        ThresholdDetector::new(self.threshold_sigma)?;
        self.model.validate()?;
        self.preprocess.validate()?;
        if self.follow && self.poll_interval_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "poll_interval_ms must be positive when following".into(),
            ));
        }
        Ok(())
    }

    pub fn source_mode(&self) -> SourceMode {
        if self.follow {
            SourceMode::Follow {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            }
        } else {
            SourceMode::Bounded
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::base_model::FeatureSet;
    use crate::preprocess::DetrendOrder;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.train_batches, 3);
        assert_eq!(cfg.source_mode(), SourceMode::Bounded);
    }

    #[test]
    fn loads_partial_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            r#"
batch_size = 200
detector = "model"
model_path = "models/iso.json"
training_reuse = "replay"

[model]
contamination = 0.05
feature_set = "channels_with_rolling"

[preprocess]
detrend_order = "constant"
"#,
        )
        .unwrap();

        let cfg = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.batch_size, 200);
        assert_eq!(cfg.detector, DetectorKind::Model);
        assert_eq!(cfg.model_path.as_deref(), Some(Path::new("models/iso.json")));
        assert_eq!(cfg.training_reuse, TrainingReuse::Replay);
        assert_eq!(cfg.model.contamination, 0.05);
        assert_eq!(cfg.model.feature_set, FeatureSet::ChannelsWithRolling);
        assert_eq!(cfg.model.n_estimators, 100);
        assert_eq!(cfg.preprocess.detrend_order, DetrendOrder::Constant);
        assert_eq!(cfg.preprocess.window_seconds, 0.5);
        assert_eq!(cfg.threshold_sigma, 3.5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cfg = PipelineConfig { batch_size: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut cfg = PipelineConfig::default();
        cfg.model.contamination = 0.9;
        assert!(cfg.validate().is_err());
    }
}
