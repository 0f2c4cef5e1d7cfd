//! Paging a document store into fixed-size, ordered batches.

pub mod jsonl;
pub mod memory;

use crate::data::{Batch, Reading};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace};

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// A document store queried by position in insertion (timestamp) order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Up to `limit` readings starting at `offset`. An empty page means there
    /// is currently nothing at `offset`.
    async fn fetch(&self, offset: usize, limit: usize) -> Result<Vec<Reading>>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    async fn fetch(&self, offset: usize, limit: usize) -> Result<Vec<Reading>> {
        (**self).fetch(offset, limit).await
    }
}

/// A lazy sequence of batches.
#[async_trait]
pub trait BatchSource: Send {
    /// Next batch of at most `batch_size` readings, or `None` once the source
    /// is exhausted. A reading is never yielded twice by the same source.
    async fn next_batch(&mut self, batch_size: usize) -> Result<Option<Batch>>;
}

/// What to do when the store has nothing more at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Flush the partial batch and end the sequence.
    Bounded,
    /// Wait for new documents, polling at the given interval.
    Follow { poll_interval: Duration },
}

/// [`BatchSource`] over any [`DocumentStore`].
///
/// The cursor only moves forward and is private to this value; the type is
/// deliberately not `Clone` so two consumers can never share it.
pub struct StoreBatchSource<S> {
    store: S,
    cursor: usize,
    mode: SourceMode,
    // readings already taken from the store but not yet emitted; survives a
    // cancelled `next_batch` call
    pending: Vec<Reading>,
    exhausted: bool,
}

impl<S: DocumentStore> StoreBatchSource<S> {
    pub fn new(store: S, mode: SourceMode) -> Self {
        StoreBatchSource {
            store,
            cursor: 0,
            mode,
            pending: Vec::new(),
            exhausted: false,
        }
    }

    pub fn bounded(store: S) -> Self {
        Self::new(store, SourceMode::Bounded)
    }

    /// Number of readings consumed from the store so far.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

#[async_trait]
impl<S: DocumentStore> BatchSource for StoreBatchSource<S> {
    async fn next_batch(&mut self, batch_size: usize) -> Result<Option<Batch>> {
        if batch_size == 0 {
            return Err(PipelineError::InvalidConfig("batch size must be positive".into()));
        }
        while self.pending.len() < batch_size && !self.exhausted {
            let want = batch_size - self.pending.len();
            let page = self.store.fetch(self.cursor, want).await?;
            trace!(offset = self.cursor, want, got = page.len(), "page fetched");

            if page.is_empty() {
                match self.mode {
                    SourceMode::Bounded => self.exhausted = true,
                    SourceMode::Follow { poll_interval } => tokio::time::sleep(poll_interval).await,
                }
                continue;
            }

            let take = page.len().min(want);
            self.cursor += take;
            self.pending.extend(page.into_iter().take(take));
        }

        if self.pending.is_empty() {
            return Ok(None);
        }
        let batch = Batch::new(std::mem::take(&mut self.pending));
        debug!(rows = batch.len(), cursor = self.cursor, "batch ready");
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::synthetic::make_dataset;

    struct Unreachable;

    #[async_trait]
    impl DocumentStore for Unreachable {
        async fn fetch(&self, _offset: usize, _limit: usize) -> Result<Vec<Reading>> {
            Err(PipelineError::SourceUnavailable("connection refused".into()))
        }
    }

    // Hands out at most 7 documents per page regardless of the limit.
    struct SmallPages {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for SmallPages {
        async fn fetch(&self, offset: usize, limit: usize) -> Result<Vec<Reading>> {
            self.inner.fetch(offset, limit.min(7)).await
        }
    }

    #[tokio::test]
    async fn batches_sum_to_store_size() {
        let store = MemoryStore::from_readings(make_dataset(5000, 0.01, Some(1)));
        let mut source = StoreBatchSource::bounded(store);
        let mut sizes = Vec::new();
        while let Some(b) = source.next_batch(1200).await.unwrap() {
            sizes.push(b.len());
        }
        assert_eq!(sizes, vec![1200, 1200, 1200, 1200, 200]);
        assert_eq!(sizes.iter().sum::<usize>(), 5000);
        assert!(source.next_batch(1200).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batches_are_ordered_and_disjoint() {
        let data = make_dataset(103, 0.0, Some(2));
        let mut source = StoreBatchSource::bounded(MemoryStore::from_readings(data.clone()));
        let mut seen = Vec::new();
        while let Some(b) = source.next_batch(10).await.unwrap() {
            assert!(b.len() <= 10);
            seen.extend(b.into_readings());
        }
        assert_eq!(seen, data);
    }

    #[tokio::test]
    async fn fills_batches_across_short_pages() {
        let store = SmallPages {
            inner: MemoryStore::from_readings(make_dataset(30, 0.0, Some(3))),
        };
        let mut source = StoreBatchSource::bounded(store);
        assert_eq!(source.next_batch(20).await.unwrap().unwrap().len(), 20);
        assert_eq!(source.next_batch(20).await.unwrap().unwrap().len(), 10);
        assert!(source.next_batch(20).await.unwrap().is_none());
        assert_eq!(source.position(), 30);
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let mut source = StoreBatchSource::bounded(MemoryStore::new());
        assert!(matches!(source.next_batch(0).await, Err(PipelineError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn store_failure_surfaces() {
        let mut source = StoreBatchSource::bounded(Unreachable);
        assert!(matches!(source.next_batch(10).await, Err(PipelineError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn follow_mode_waits_for_new_data() {
        let store = MemoryStore::from_readings(make_dataset(5, 0.0, Some(4)));
        let writer = store.clone();
        let mut source = StoreBatchSource::new(
            store,
            SourceMode::Follow { poll_interval: Duration::from_millis(5) },
        );

        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer.extend(make_dataset(10, 0.0, Some(5)));
        });

        let batch = tokio::time::timeout(Duration::from_secs(2), source.next_batch(8))
            .await
            .expect("follow source never produced a batch")
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 8);
        feeder.await.unwrap();
    }
}
