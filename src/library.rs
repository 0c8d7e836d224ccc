//! Catalog operations over a single book: lookup, presence check, delete,
//! format conversion and asset retrieval.
//!
//! Used by the CLI commands and the HTTP API. Every operation goes through
//! the [`SearchBackend`] and [`AssetStorage`] seams, so it behaves the same
//! on SQLite or in memory, on local disk or in a bucket.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::fingerprint::compute_identity_hash;
use crate::models::{BookRecord, Location, SearchPage, EPUB_TAG, MOBI_TAG};
use crate::normalize::normalize_name;
use crate::traits::{AssetStorage, SearchBackend};

#[derive(Clone)]
pub struct Library {
    backend: Arc<dyn SearchBackend>,
    storage: Arc<dyn AssetStorage>,
    convert_command: String,
}

impl Library {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        storage: Arc<dyn AssetStorage>,
        convert_command: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            storage,
            convert_command: convert_command.into(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchPage> {
        self.backend.search(query, limit, offset).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.backend.count().await
    }

    pub async fn get(&self, hash: &str) -> Result<Option<BookRecord>> {
        self.backend.get_by_hash(hash).await
    }

    async fn require(&self, hash: &str) -> Result<BookRecord> {
        match self.backend.get_by_hash(hash).await? {
            Some(record) => Ok(record),
            None => bail!("book not found: {}", hash),
        }
    }

    /// Identity hash an (author, title) pair maps to after normalization.
    pub fn identity_for(author: &str, title: &str) -> String {
        compute_identity_hash(
            &normalize_name(author, true, true),
            &normalize_name(title, true, false),
        )
    }

    /// Whether a book with this author and title is already cataloged.
    pub async fn exists(&self, author: &str, title: &str) -> Result<bool> {
        let hash = Self::identity_for(author, title);
        Ok(self.backend.get_by_hash(&hash).await?.is_some())
    }

    /// Remove every stored asset of the book, then its index entry.
    ///
    /// Assets that are already gone do not count as failures. Returns false
    /// when no such book exists.
    pub async fn delete(&self, hash: &str) -> Result<bool> {
        let Some(record) = self.backend.get_by_hash(hash).await? else {
            return Ok(false);
        };

        for (tag, location) in &record.locations {
            self.storage
                .delete(location)
                .await
                .with_context(|| format!("Failed to delete {} asset {}", tag, location))?;
        }

        let removed = self.backend.delete_by_hash(hash).await?;
        info!(hash = %hash, title = %record.title, "book deleted");
        Ok(removed)
    }

    /// Convert the book's EPUB with the configured command and record the
    /// result as its `mobi` location.
    pub async fn convert(&self, hash: &str) -> Result<Location> {
        let record = self.require(hash).await?;
        if record.converted {
            if let Some(existing) = record.locations.get(MOBI_TAG) {
                return Ok(existing.clone());
            }
        }

        let Some(epub) = record.locations.get(EPUB_TAG) else {
            bail!("book {} has no {} location", hash, EPUB_TAG);
        };
        let Some(epub_path) = epub.as_path() else {
            bail!("conversion needs a local file, {} is {}", hash, epub);
        };
        let mobi_path = epub_path.with_extension(MOBI_TAG);

        let status = tokio::process::Command::new(&self.convert_command)
            .arg(epub_path)
            .arg(&mobi_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.convert_command))?;
        if !status.success() {
            bail!(
                "{} exited with {} for {}",
                self.convert_command,
                status,
                epub_path.display()
            );
        }

        let location = Location::file(&mobi_path);
        self.backend.set_location(hash, MOBI_TAG, &location).await?;
        self.backend.set_converted(hash, true).await?;
        info!(hash = %hash, output = %mobi_path.display(), "converted");
        Ok(location)
    }

    /// Copy the asset stored under `tag` to `dest`. Returns the bytes written.
    pub async fn fetch(&self, hash: &str, tag: &str, dest: &Path) -> Result<u64> {
        let record = self.require(hash).await?;
        let Some(location) = record.locations.get(tag) else {
            bail!("book {} has no {} location", hash, tag);
        };

        let mut reader = self.storage.retrieve(location).await?;
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        Ok(written)
    }

    /// Default output file name for [`fetch`](Self::fetch).
    pub fn default_fetch_name(record: &BookRecord, tag: &str) -> PathBuf {
        let base = crate::storage::book_path(&record.author, &record.title);
        let name = base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.identity_hash.clone());
        PathBuf::from(format!("{}.{}", name, tag))
    }
}
