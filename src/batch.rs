//! Batch writer.
//!
//! Buffers accepted records and hands them to the search backend in groups
//! of `capacity`. A failed flush is logged and its records are counted as
//! lost; the buffer is cleared either way so later batches still go out.

use std::sync::Arc;

use crate::error::IngestError;
use crate::models::BookRecord;
use crate::traits::SearchBackend;

/// Counters produced by a [`BatchWriter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushTally {
    pub written: u64,
    pub lost: u64,
    pub flushes: u64,
}

pub struct BatchWriter {
    backend: Arc<dyn SearchBackend>,
    capacity: usize,
    buffer: Vec<BookRecord>,
    tally: FlushTally,
}

impl BatchWriter {
    pub fn new(backend: Arc<dyn SearchBackend>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            backend,
            capacity,
            buffer: Vec::with_capacity(capacity),
            tally: FlushTally::default(),
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn tally(&self) -> FlushTally {
        self.tally
    }

    pub async fn push(&mut self, record: BookRecord) {
        self.buffer.push(record);
        if self.buffer.len() >= self.capacity {
            self.flush().await;
        }
    }

    /// Flush the remainder. Consumes the writer so the final flush happens once.
    pub async fn finish(mut self) -> FlushTally {
        if !self.buffer.is_empty() {
            self.flush().await;
        }
        self.tally
    }

    async fn flush(&mut self) {
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        self.tally.flushes += 1;
        match self.backend.add_batch(&batch).await {
            Ok(()) => {
                self.tally.written += batch.len() as u64;
                tracing::debug!(records = batch.len(), "batch flushed");
            }
            Err(e) => {
                let err = IngestError::BackendWrite {
                    records: batch.len(),
                    message: format!("{:#}", e),
                };
                tracing::error!(records = batch.len(), error = %err, "batch flush failed");
                self.tally.lost += batch.len() as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::compute_identity_hash;
    use crate::store::memory::MemoryBackend;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn record(i: usize) -> BookRecord {
        let title = format!("Book {}", i);
        BookRecord {
            identity_hash: compute_identity_hash("Author", &title),
            title,
            author: "Author".to_string(),
            language: "en".to_string(),
            description: String::new(),
            phonetic_keys: BTreeSet::new(),
            search_tokens: BTreeSet::new(),
            added_at: Utc::now(),
            locations: BTreeMap::new(),
            converted: false,
        }
    }

    #[tokio::test]
    async fn flushes_full_batches_and_remainder() {
        let backend = Arc::new(MemoryBackend::new());
        let mut writer = BatchWriter::new(backend.clone(), 50);
        for i in 0..120 {
            writer.push(record(i)).await;
        }
        assert_eq!(writer.pending(), 20);
        let tally = writer.finish().await;

        assert_eq!(backend.batch_sizes(), vec![50, 50, 20]);
        assert_eq!(tally.flushes, 3);
        assert_eq!(tally.written, 120);
        assert_eq!(tally.lost, 0);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_empty_flush() {
        let backend = Arc::new(MemoryBackend::new());
        let mut writer = BatchWriter::new(backend.clone(), 50);
        for i in 0..100 {
            writer.push(record(i)).await;
        }
        let tally = writer.finish().await;
        assert_eq!(backend.batch_sizes(), vec![50, 50]);
        assert_eq!(tally.flushes, 2);
    }

    #[tokio::test]
    async fn failed_flush_does_not_block_later_batches() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next_writes(1);
        let mut writer = BatchWriter::new(backend.clone(), 2);
        for i in 0..5 {
            writer.push(record(i)).await;
        }
        let tally = writer.finish().await;
        assert_eq!(tally.lost, 2);
        assert_eq!(tally.written, 3);
        assert_eq!(tally.flushes, 3);
        assert_eq!(backend.len(), 3);
    }
}
