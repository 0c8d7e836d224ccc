//! Collaborator seams of the ingestion pipeline.
//!
//! The scanner depends only on these traits, so the container parser, the
//! search index and the asset storage can each be swapped (SQLite or
//! in-memory index, local or object storage, real or instrumented parser).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────┐
//! │  MetadataExtractor   │◀─────│                  │
//! │  (EPUB OPF parser)   │      │                  │
//! └──────────────────────┘      │                  │     ┌────────────────┐
//! ┌──────────────────────┐      │     Scanner      │────▶│ SearchBackend  │
//! │    AssetStorage      │◀─────│  (worker pool)   │     │ SQLite/memory  │
//! │  local file / S3     │      │                  │     └────────────────┘
//! └──────────────────────┘      └──────────────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncRead;

use crate::extract::{BookMetadata, ExtractError};
use crate::models::{BookRecord, Location, RefreshResult, SearchPage};

// ═══════════════════════════════════════════════════════════════════════
// Metadata extraction
// ═══════════════════════════════════════════════════════════════════════

/// Reads title, author, language and description out of an ebook file.
///
/// Called from a blocking thread with one file at a time; implementations
/// may do synchronous I/O.
pub trait MetadataExtractor: Send + Sync {
    fn parse(&self, path: &Path) -> Result<BookMetadata, ExtractError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Search backend
// ═══════════════════════════════════════════════════════════════════════

/// Persists catalog records keyed by identity hash and answers queries.
///
/// `add_batch` must be idempotent per identity hash: delivering the same
/// record twice leaves a single entry.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_batch`](SearchBackend::add_batch) | Insert records, ignoring known hashes |
/// | [`delete_by_hash`](SearchBackend::delete_by_hash) | Remove one record |
/// | [`get_by_hash`](SearchBackend::get_by_hash) | Fetch one record |
/// | [`count`](SearchBackend::count) | Number of records |
/// | [`search`](SearchBackend::search) | Conjunctive lexical/phonetic search |
/// | [`set_location`](SearchBackend::set_location) | Mark another stored format |
/// | [`set_converted`](SearchBackend::set_converted) | Flip the converted flag |
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn add_batch(&self, records: &[BookRecord]) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete_by_hash(&self, hash: &str) -> Result<bool>;

    async fn get_by_hash(&self, hash: &str) -> Result<Option<BookRecord>>;

    async fn count(&self) -> Result<u64>;

    /// Newest first. `total` counts every match, not just this page.
    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchPage>;

    /// Returns whether the record exists.
    async fn set_location(&self, hash: &str, tag: &str, location: &Location) -> Result<bool>;

    /// Returns whether the record exists.
    async fn set_converted(&self, hash: &str, converted: bool) -> Result<bool>;

    /// Append a scan summary to the persisted history.
    async fn record_refresh(&self, _result: &RefreshResult) -> Result<()> {
        Ok(())
    }

    /// Most recent scan summaries, newest first.
    async fn refreshes(&self, _limit: usize) -> Result<Vec<RefreshResult>> {
        Ok(Vec::new())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Asset storage
// ═══════════════════════════════════════════════════════════════════════

/// Byte stream over a stored asset.
pub type AssetReader = Box<dyn AsyncRead + Send + Unpin>;

/// Owns the primary ebook files referenced by [`Location`]s.
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Take ownership of the file at `path` for `record`.
    async fn store(&self, path: &Path, record: &BookRecord) -> Result<Location>;

    async fn retrieve(&self, location: &Location) -> Result<AssetReader>;

    /// Remove the stored asset. An asset that is already gone is not an error.
    async fn delete(&self, location: &Location) -> Result<()>;
}
