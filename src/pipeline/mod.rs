pub mod config;
pub mod orchestrator;

pub use config::{PipelineConfig, TrainingReuse};
pub use orchestrator::{BatchOutcome, Orchestrator, RunSummary};
