//! Failure routing.
//!
//! Files that fail to parse or are refused by the policy filter are moved to
//! the quarantine directory together with every sibling sharing their file
//! stem (`book.epub` drags `book.mobi` and `book.jpg` along). Move failures
//! are logged and never abort the scan.

use std::path::{Path, PathBuf};

use crate::storage::local::{move_file, reserve_path};

#[derive(Debug, Clone)]
pub struct Quarantine {
    dir: PathBuf,
}

impl Quarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move `path` and its same-stem siblings into the quarantine directory.
    /// Returns the destination of every file that was moved.
    ///
    /// A name already taken in the quarantine gets a `-2`, `-3`, ... suffix;
    /// siblings follow the stem chosen for `path`.
    pub async fn route(&self, path: &Path) -> Vec<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::error!(dir = %self.dir.display(), error = %e, "cannot create quarantine directory");
            return Vec::new();
        }

        let mut moved = Vec::new();
        let mut stem: Option<String> = None;
        for source in siblings(path).await {
            let wanted = stem.clone().unwrap_or_else(|| stem_of(&source));
            let target = match reserve_path(&self.dir, &wanted, &ext_of(&source)).await {
                Ok(target) => target,
                Err(e) => {
                    tracing::error!(file = %source.display(), error = %e, "quarantine move failed");
                    continue;
                }
            };
            match move_file(&source, &target).await {
                Ok(()) => {
                    tracing::debug!(from = %source.display(), to = %target.display(), "quarantined");
                    if stem.is_none() {
                        stem = Some(stem_of(&target));
                    }
                    moved.push(target);
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&target).await;
                    tracing::error!(file = %source.display(), error = %e, "quarantine move failed");
                }
            }
        }
        moved
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn ext_of(path: &Path) -> String {
    path.extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `path` itself plus every file in the same directory with the same stem.
async fn siblings(path: &Path) -> Vec<PathBuf> {
    let mut out = vec![path.to_path_buf()];
    let (Some(parent), Some(stem)) = (path.parent(), path.file_stem()) else {
        return out;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };

    let Ok(mut entries) = tokio::fs::read_dir(parent).await else {
        return out;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let candidate = entry.path();
        if candidate.file_name() == path.file_name() {
            continue;
        }
        if !entry.file_type().await.is_ok_and(|t| t.is_file()) {
            continue;
        }
        if candidate.file_stem() == Some(stem) {
            out.push(candidate);
        }
    }
    out[1..].sort();
    out
}
