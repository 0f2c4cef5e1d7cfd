use crate::data::{Batch, FeatureRow};
use crate::error::{PipelineError, Result};
use crate::models::base_model::{AnyDetector, Detector, DetectorKind};
use crate::models::model_detector::ModelDetector;
use crate::models::threshold::ThresholdDetector;
use crate::pipeline::config::{PipelineConfig, TrainingReuse};
use crate::preprocess::Preprocessor;
use crate::sink::{AnomalyRecord, AnomalySink};
use crate::source::BatchSource;
use crate::utils::evaluation::{Evaluator, Metrics};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use tracing::{debug, info, instrument, warn};

/// Totals for one call to [`Orchestrator::run`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub batches: usize,
    pub readings: usize,
    pub scored_rows: usize,
    pub anomalies: usize,
    /// Rows the model was fitted on during this run (0 when loaded or not needed).
    pub training_rows: usize,
    /// The run stopped because shutdown was requested.
    pub interrupted: bool,
    pub evaluation: Evaluator,
}

impl RunSummary {
    pub fn metrics(&self) -> Option<Metrics> {
        self.evaluation.metrics()
    }
}

/// Flags for one preprocessed batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub rows: Vec<FeatureRow>,
    pub flags: Vec<bool>,
}

impl BatchOutcome {
    pub fn anomalies(&self) -> impl Iterator<Item = &FeatureRow> {
        self.rows.iter().zip(&self.flags).filter(|(_, f)| **f).map(|(r, _)| r)
    }

    pub fn anomaly_count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }
}

/// Drives source -> preprocess -> detector -> sink, one batch at a time.
///
/// The orchestrator owns its source, so the store cursor cannot be shared with
/// another pipeline.
pub struct Orchestrator<S, K> {
    config: PipelineConfig,
    source: S,
    sink: K,
    preprocessor: Preprocessor,
    detector: Option<AnyDetector>,
    prepared: bool,
    replay: VecDeque<Batch>,
    training_rows: usize,
    progress: ProgressBar,
}

impl<S: BatchSource, K: AnomalySink> Orchestrator<S, K> {
    pub fn new(config: PipelineConfig, source: S, sink: K) -> Result<Self> {
        config.validate()?;
        let preprocessor = Preprocessor::new(config.preprocess.clone())?;
        Ok(Orchestrator {
            config,
            source,
            sink,
            preprocessor,
            detector: None,
            prepared: false,
            replay: VecDeque::new(),
            training_rows: 0,
            progress: ProgressBar::hidden(),
        })
    }

    /// Use an already built detector instead of resolving one from the config.
    pub fn with_detector(mut self, detector: impl Into<AnyDetector>) -> Self {
        self.detector = Some(detector.into());
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn detector(&self) -> Option<&AnyDetector> {
        self.detector.as_ref()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }


    /// Resolve the detector (loading or training a model if needed) and clear
    /// the sink. Called by [`Orchestrator::run`] when not done beforehand.
    #[instrument(skip(self), fields(detector = ?self.config.detector))]
    pub async fn prepare(&mut self) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        if self.detector.is_none() {
            let detector = self.resolve_detector().await?;
            info!(detector = detector.name(), "detector ready");
            self.detector = Some(detector);
        }
        if self.config.clear_sink {
            warn!("clearing anomaly sink, output of previous runs is deleted");
            self.sink.clear().await?;
        }
        self.prepared = true;
        Ok(())
    }

    async fn resolve_detector(&mut self) -> Result<AnyDetector> {
        match self.config.detector {
            DetectorKind::Threshold => Ok(ThresholdDetector::new(self.config.threshold_sigma)?.into()),
            DetectorKind::Model => {
                if let Some(path) = &self.config.model_path {
                    match ModelDetector::load(path) {
                        Ok(det) => return Ok(det.into()),
                        Err(PipelineError::ModelNotFound { path }) if self.config.train_if_missing => {
                            info!(path = %path.display(), "no saved model, training a fresh one");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(self.bootstrap_model().await?.into())
            }
        }
    }

    /// Drain `train_batches` batches, fit a fresh model on their preprocessed
    /// rows and persist it when a model path is configured.
    #[instrument(skip(self), fields(batches = self.config.train_batches))]
    async fn bootstrap_model(&mut self) -> Result<ModelDetector> {
        let mut detector = ModelDetector::new(self.config.model.clone())?;
        // batches queued by an earlier, interrupted bootstrap never reached a model
        self.replay.clear();
        let mut batches = Vec::with_capacity(self.config.train_batches);

        while batches.len() < self.config.train_batches {
            let Some(batch) = self.source.next_batch(self.config.batch_size).await? else {
                warn!(
                    collected = batches.len(),
                    wanted = self.config.train_batches,
                    "source ended before all training batches were collected"
                );
                break;
            };
            if self.config.training_reuse == TrainingReuse::Replay {
                self.replay.push_back(batch.clone());
            }
            batches.push(batch);
        }

        let training = self.preprocessor.preprocess_all(&batches);
        info!(batches = batches.len(), rows = training.len(), "training isolation forest");
        detector.fit(&training)?;
        self.training_rows = training.len();

        if let Some(path) = &self.config.model_path {
            detector.save(path)?;
        }
        Ok(detector)
    }

    /// Run until the source ends, `max_batches` is reached or `shutdown`
    /// completes.
    ///
    /// Shutdown is honoured between batches and while waiting on the source or
    /// the pacing delay, never in the middle of a sink append, so the sink only
    /// ever holds whole batches of anomalies.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        if !self.prepared {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("stopped before the first batch");
                    summary.interrupted = true;
                    return Ok(summary);
                }
                res = self.prepare() => res?,
            }
        }
        summary.training_rows = self.training_rows;

        let Orchestrator {
            config,
            source,
            sink,
            preprocessor,
            detector,
            replay,
            progress,
            ..
        } = self;
        let detector = detector.as_ref().ok_or(PipelineError::NotFitted)?;
        let pacing = config.pacing();

        info!(detector = detector.name(), batch_size = config.batch_size, "streaming");
        loop {
            if config.max_batches.is_some_and(|max| summary.batches >= max) {
                break;
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    summary.interrupted = true;
                    break;
                }
                _ = std::future::ready(()) => {}
            }

            let batch = match replay.pop_front() {
                Some(b) => b,
                None => {
                    let next = tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            summary.interrupted = true;
                            break;
                        }
                        next = source.next_batch(config.batch_size) => next?,
                    };
                    match next {
                        Some(b) => b,
                        None => break,
                    }
                }
            };

            let outcome = detect(preprocessor, detector, &batch)?;
            let records: Vec<AnomalyRecord> = outcome.anomalies().map(AnomalyRecord::from).collect();
            sink.append(&records).await?;

            summary.batches += 1;
            summary.readings += batch.len();
            summary.scored_rows += outcome.rows.len();
            summary.anomalies += records.len();
            summary.evaluation.update_many(
                outcome.rows.iter().zip(&outcome.flags).map(|(r, f)| (r.reading.is_anomaly, *f)),
            );
            report(summary.batches, &outcome, &records);
            progress.inc(1);
            progress.set_message(format!("{} anomalies", summary.anomalies));

            if !pacing.is_zero() {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        summary.interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(pacing) => {}
                }
            }
        }

        progress.finish_and_clear();
        info!(
            batches = summary.batches,
            readings = summary.readings,
            anomalies = summary.anomalies,
            interrupted = summary.interrupted,
            "run finished"
        );
        Ok(summary)
    }
}

fn detect(preprocessor: &Preprocessor, detector: &AnyDetector, batch: &Batch) -> Result<BatchOutcome> {
    let rows = preprocessor.preprocess(batch);
    let flags = detector.predict(&rows)?;
    Ok(BatchOutcome { rows, flags })
}

fn report(batch_no: usize, outcome: &BatchOutcome, records: &[AnomalyRecord]) {
    if records.is_empty() {
        debug!(batch = batch_no, rows = outcome.rows.len(), "no anomalies");
        return;
    }
    let first: Vec<f64> = records.iter().take(3).map(AnomalyRecord::timestamp).collect();
    info!(
        batch = batch_no,
        rows = outcome.rows.len(),
        anomalies = records.len(),
        first_timestamps = ?first,
        "anomalies detected"
    );
}
