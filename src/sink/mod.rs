//! Append-only destinations for flagged rows.

pub mod jsonl;
pub mod memory;

use crate::data::{FeatureRow, Reading};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use jsonl::JsonlSink;
pub use memory::MemorySink;

/// Document written for every flagged row: the reading exactly as it came from
/// the source, timestamp as plain seconds. Flagged timestamps are therefore
/// always a subset of the source timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnomalyRecord {
    pub reading: Reading,
}

impl AnomalyRecord {
    pub fn timestamp(&self) -> f64 {
        self.reading.timestamp
    }
}

impl From<&FeatureRow> for AnomalyRecord {
    fn from(row: &FeatureRow) -> Self {
        AnomalyRecord { reading: row.reading }
    }
}

#[async_trait]
pub trait AnomalySink: Send {
    /// Remove everything a previous run wrote.
    async fn clear(&mut self) -> Result<()>;

    /// Append one batch of records. Either every record is stored or, on
    /// error, none of them are.
    async fn append(&mut self, records: &[AnomalyRecord]) -> Result<()>;
}

#[async_trait]
impl<K: AnomalySink + ?Sized> AnomalySink for Box<K> {
    async fn clear(&mut self) -> Result<()> {
        (**self).clear().await
    }

    async fn append(&mut self, records: &[AnomalyRecord]) -> Result<()> {
        (**self).append(records).await
    }
}

/// Sink that drops everything, for runs that only report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl AnomalySink for NullSink {
    async fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    async fn append(&mut self, _records: &[AnomalyRecord]) -> Result<()> {
        Ok(())
    }
}
