use crate::data::FeatureRow;
use crate::error::{PipelineError, Result};
use crate::models::base_model::{Detector, FeatureSet};
use crate::models::iforest::IsolationForest;
use crate::utils::stats::quantile_sorted;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Bumped whenever the persisted layout of [`DetectorModel`] changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Expected share of anomalies in the training data; sets the decision threshold.
    pub contamination: f64,
    pub random_seed: u64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub feature_set: FeatureSet,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            contamination: 0.02,
            random_seed: 42,
            n_estimators: 100,
            max_samples: 256,
            feature_set: FeatureSet::Channels,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(PipelineError::InvalidConfig(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 || self.max_samples == 0 {
            return Err(PipelineError::InvalidConfig(
                "n_estimators and max_samples must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Trained state of a [`ModelDetector`]. Everything `predict` depends on lives
/// here, so a reloaded model flags rows exactly like the one that was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorModel {
    pub format_version: u32,
    pub feature_set: FeatureSet,
    /// Rows scoring strictly above this value are anomalies.
    pub threshold: f64,
    pub training_rows: usize,
    pub config: ModelConfig,
    forest: IsolationForest,
}

impl DetectorModel {
    pub fn n_features(&self) -> usize {
        self.forest.n_features()
    }

    /// Write the model as JSON. The file is written next to `path` first and
    /// renamed into place, so readers never observe a half-written model.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(self)?)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), trees = self.forest.n_estimators(), "model saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::ModelNotFound { path: path.to_path_buf() })
            }
            Err(e) => return Err(e.into()),
        };
        let model: DetectorModel = serde_json::from_slice(&bytes)?;
        if model.format_version != MODEL_FORMAT_VERSION {
            return Err(PipelineError::UnsupportedModelFormat {
                found: model.format_version,
                expected: MODEL_FORMAT_VERSION,
            });
        }
        info!(path = %path.display(), threshold = model.threshold, "model loaded");
        Ok(model)
    }
}

/// Isolation-forest outlier detector trained on reference rows.
#[derive(Debug, Clone)]
pub struct ModelDetector {
    config: ModelConfig,
    model: Option<DetectorModel>,
}

impl ModelDetector {
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(ModelDetector { config, model: None })
    }

    pub fn from_model(model: DetectorModel) -> Self {
        ModelDetector {
            config: model.config.clone(),
            model: Some(model),
        }
    }

    /// Rebuild a detector from a file written by [`ModelDetector::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        DetectorModel::load(path).map(Self::from_model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.model()?.save(path)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Result<&DetectorModel> {
        self.model.as_ref().ok_or(PipelineError::NotFitted)
    }

    /// Train on a raw feature matrix. Any previous model is discarded.
    pub fn fit_matrix(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(PipelineError::EmptyTrainingSet);
        }
        let cfg = &self.config;
        let forest = IsolationForest::fit(x, cfg.n_estimators, cfg.max_samples, cfg.random_seed);

        let mut scores = forest.score_samples(x);
        scores.sort_by(|a, b| a.total_cmp(b));
        let threshold = quantile_sorted(&scores, 1.0 - cfg.contamination);

        debug!(rows = x.nrows(), threshold, "isolation forest fitted");
        self.model = Some(DetectorModel {
            format_version: MODEL_FORMAT_VERSION,
            feature_set: cfg.feature_set,
            threshold,
            training_rows: x.nrows(),
            config: cfg.clone(),
            forest,
        });
        Ok(())
    }

    /// Anomaly scores in `(0, 1]` from a raw feature matrix.
    pub fn score_matrix(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        let model = self.model()?;
        if x.nrows() > 0 && x.ncols() != model.n_features() {
            return Err(PipelineError::FeatureMismatch {
                expected: model.n_features(),
                found: x.ncols(),
            });
        }
        Ok(model.forest.score_samples(x))
    }

    pub fn predict_matrix(&self, x: ArrayView2<'_, f64>) -> Result<Vec<bool>> {
        let threshold = self.model()?.threshold;
        Ok(self.score_matrix(x)?.into_iter().map(|s| s > threshold).collect())
    }

    /// Anomaly scores for feature rows, using the feature set the model was trained on.
    pub fn score(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
        let x = self.model()?.feature_set.matrix(rows);
        self.score_matrix(x.view())
    }
}

impl Detector for ModelDetector {
    fn fit(&mut self, rows: &[FeatureRow]) -> Result<()> {
        let x = self.config.feature_set.matrix(rows);
        self.fit_matrix(x.view())
    }

    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<bool>> {
        let x = self.model()?.feature_set.matrix(rows);
        self.predict_matrix(x.view())
    }

    fn name(&self) -> &'static str {
        "isolation_forest"
    }
}
