use crate::error::Result;
use crate::sink::{AnomalyRecord, AnomalySink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// In-process sink; clones share the stored records so tests can inspect
/// what a running pipeline wrote.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AnomalyRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AnomalyRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AnomalySink for MemorySink {
    async fn clear(&mut self) -> Result<()> {
        self.records.lock().clear();
        Ok(())
    }

    async fn append(&mut self, records: &[AnomalyRecord]) -> Result<()> {
        self.records.lock().extend_from_slice(records);
        Ok(())
    }
}
