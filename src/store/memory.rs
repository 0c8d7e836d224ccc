//! In-memory [`SearchBackend`] for tests and single-process use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Search is a linear
//! scan over every record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::fingerprint;
use crate::models::{BookRecord, Location, RefreshResult, SearchPage};
use crate::traits::SearchBackend;

pub struct MemoryBackend {
    records: RwLock<HashMap<String, BookRecord>>,
    refreshes: RwLock<Vec<RefreshResult>>,
    batch_sizes: RwLock<Vec<usize>>,
    failing_writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            refreshes: RwLock::new(Vec::new()),
            batch_sizes: RwLock::new(Vec::new()),
            failing_writes: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        read(&self.records).map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of every `add_batch` call received, in order, including failed ones.
    pub fn batch_sizes(&self) -> Vec<usize> {
        read(&self.batch_sizes)
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// Make the next `n` calls to `add_batch` fail without storing anything.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("memory backend lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("memory backend lock poisoned"))
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn add_batch(&self, records: &[BookRecord]) -> Result<()> {
        write(&self.batch_sizes)?.push(records.len());

        let should_fail = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            bail!("simulated write failure");
        }

        let mut stored = write(&self.records)?;
        for record in records {
            stored
                .entry(record.identity_hash.clone())
                .or_insert_with(|| record.clone());
        }
        Ok(())
    }

    async fn delete_by_hash(&self, hash: &str) -> Result<bool> {
        Ok(write(&self.records)?.remove(hash).is_some())
    }

    async fn get_by_hash(&self, hash: &str) -> Result<Option<BookRecord>> {
        Ok(read(&self.records)?.get(hash).cloned())
    }

    async fn count(&self) -> Result<u64> {
        Ok(read(&self.records)?.len() as u64)
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchPage> {
        let stored = read(&self.records)?;
        let mut hits: Vec<&BookRecord> = stored
            .values()
            .filter(|r| fingerprint::matches(r, query))
            .collect();
        hits.sort_by(|a, b| {
            b.added_at
                .cmp(&a.added_at)
                .then_with(|| a.identity_hash.cmp(&b.identity_hash))
        });

        let total = hits.len() as u64;
        let items = hits
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(SearchPage { items, total })
    }

    async fn set_location(&self, hash: &str, tag: &str, location: &Location) -> Result<bool> {
        let mut stored = write(&self.records)?;
        match stored.get_mut(hash) {
            Some(record) => {
                record.locations.insert(tag.to_string(), location.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_converted(&self, hash: &str, converted: bool) -> Result<bool> {
        let mut stored = write(&self.records)?;
        match stored.get_mut(hash) {
            Some(record) => {
                record.converted = converted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_refresh(&self, result: &RefreshResult) -> Result<()> {
        write(&self.refreshes)?.push(result.clone());
        Ok(())
    }

    async fn refreshes(&self, limit: usize) -> Result<Vec<RefreshResult>> {
        let history = read(&self.refreshes)?;
        Ok(history.iter().rev().take(limit).cloned().collect())
    }
}
