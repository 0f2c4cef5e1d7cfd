//! Streaming anomaly detection for robot IMU and lidar readings.
//!
//! Readings are paged from a document store into fixed-size batches, each batch
//! is detrended and enriched with trailing rolling statistics, and every
//! resulting row is flagged by either a z-score rule or an isolation forest.
//! Flagged rows go to an append-only sink.

pub mod data;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod sink;
pub mod source;
pub mod utils;

#[cfg(feature = "python")]
mod python;

pub use data::{Batch, Channel, FeatureRow, Reading, CHANNEL_COUNT};
pub use error::{PipelineError, Result};
pub use models::base_model::{AnyDetector, Detector, DetectorKind, FeatureSet};
pub use models::model_detector::{DetectorModel, ModelConfig, ModelDetector};
pub use models::threshold::ThresholdDetector;
pub use pipeline::{Orchestrator, PipelineConfig, RunSummary, TrainingReuse};
pub use preprocess::{DetrendOrder, PreprocessConfig, Preprocessor};
pub use sink::{AnomalyRecord, AnomalySink, JsonlSink, MemorySink, NullSink};
pub use source::{BatchSource, DocumentStore, JsonlStore, MemoryStore, SourceMode, StoreBatchSource};

/// A Python module implemented in Rust.
#[cfg(feature = "python")]
#[pyo3::pymodule]
fn sensor_anomaly(_py: pyo3::Python, m: &pyo3::types::PyModule) -> pyo3::PyResult<()> {
    // ThresholdDetector:
    m.add_class::<python::PyThresholdDetector>()?;
    // ModelDetector:
    m.add_class::<python::PyModelDetector>()?;
    Ok(())
}
