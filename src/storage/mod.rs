//! Storage backends for the primary ebook asset.
//!
//! [`LocalStorage`] keeps files on disk, either where they were found or
//! organized into a library directory. [`S3Storage`] uploads them to an
//! S3-compatible bucket and removes the local copy.

pub mod local;
pub mod s3;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{StorageConfig, StorageKind};
use crate::traits::AssetStorage;

pub use local::{book_path, LocalStorage};
pub use s3::S3Storage;

/// Build the storage backend selected by `[storage] kind`.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn AssetStorage>> {
    match config.kind {
        StorageKind::Local => Ok(Arc::new(LocalStorage::new(config.library_dir.clone()))),
        StorageKind::S3 => {
            let s3 = config
                .s3
                .clone()
                .context("storage.kind = \"s3\" requires a [storage.s3] section")?;
            Ok(Arc::new(S3Storage::from_env(s3)?))
        }
    }
}
