//! Core data models used throughout booksing.
//!
//! These types represent the files, catalog records, and scan summaries that
//! flow through the ingestion pipeline and into the search backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use uuid::Uuid;

/// Location tag of the primary ebook asset.
pub const EPUB_TAG: &str = "epub";
/// Location tag of a converted companion asset.
pub const MOBI_TAG: &str = "mobi";

/// Raw metadata read from a file before normalization.
///
/// Created by the metadata extractor, consumed by the pipeline and never
/// persisted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub title: String,
    pub author: String,
    pub language: String,
    pub description: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// Where a stored asset lives. Exactly one kind per value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    File {
        path: PathBuf,
    },
    ObjectStore {
        host: String,
        bucket: String,
        key: String,
    },
}

impl Location {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Location::File { path: path.into() }
    }

    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            Location::File { path } => Some(path),
            Location::ObjectStore { .. } => None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::File { path } => write!(f, "file://{}", path.display()),
            Location::ObjectStore { host, bucket, key } => {
                write!(f, "s3://{}/{}/{}", host, bucket, key)
            }
        }
    }
}

/// Catalog entry delivered to the search backend.
///
/// `identity_hash` is derived from the normalized author and title;
/// `phonetic_keys` and `search_tokens` come from the same "title author"
/// string and are never changed after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub identity_hash: String,
    pub title: String,
    pub author: String,
    pub language: String,
    pub description: String,
    pub phonetic_keys: BTreeSet<String>,
    pub search_tokens: BTreeSet<String>,
    pub added_at: DateTime<Utc>,
    pub locations: BTreeMap<String, Location>,
    #[serde(default)]
    pub converted: bool,
}

impl BookRecord {
    /// True when every query token is one of this record's search tokens.
    pub fn has_search_tokens(&self, terms: &[String]) -> bool {
        terms.iter().all(|t| self.search_tokens.contains(t))
    }

    /// True when every query code is one of this record's phonetic keys.
    pub fn has_phonetic_keys(&self, codes: &[String]) -> bool {
        codes.iter().all(|c| self.phonetic_keys.contains(c))
    }

    pub fn has_location(&self, tag: &str) -> bool {
        self.locations.contains_key(tag)
    }

    /// True when any file location of this record points at `path`.
    pub fn is_stored_at(&self, path: &std::path::Path) -> bool {
        self.locations
            .values()
            .any(|loc| loc.as_path().is_some_and(|p| p == path))
    }
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub items: Vec<BookRecord>,
    pub total: u64,
}

/// Summary of a single scan. Appended to the history once and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResult {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub already_present: u64,
    pub added: u64,
    pub duplicate: u64,
    /// Parse failures plus policy rejections.
    pub invalid: u64,
    /// Subset of `invalid` rejected by the policy filter.
    pub rejected: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl RefreshResult {
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            stopped_at: started_at,
            already_present: 0,
            added: 0,
            duplicate: 0,
            invalid: 0,
            rejected: 0,
            failed: 0,
            cancelled: 0,
        }
    }

    /// Number of files that produced an outcome.
    pub fn total(&self) -> u64 {
        self.already_present + self.added + self.duplicate + self.invalid + self.failed + self.cancelled
    }
}
