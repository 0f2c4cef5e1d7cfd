use crate::data::Reading;
use crate::error::Result;
use crate::source::DocumentStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// In-process store. Clones share the same documents, so one handle can keep
/// appending while a source reads from another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<Vec<Reading>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_readings(readings: Vec<Reading>) -> Self {
        MemoryStore {
            docs: Arc::new(RwLock::new(readings)),
        }
    }

    pub fn extend(&self, readings: impl IntoIterator<Item = Reading>) {
        self.docs.write().extend(readings);
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(&self, offset: usize, limit: usize) -> Result<Vec<Reading>> {
        let docs = self.docs.read();
        let start = offset.min(docs.len());
        let end = offset.saturating_add(limit).min(docs.len());
        Ok(docs[start..end].to_vec())
    }
}
