//! Filesystem discovery under the import root.
//!
//! Walks `scan.import_dir`, applies include/exclude globs relative to the
//! root, and returns the matching file paths in sorted order. The quarantine
//! and library directories are skipped when they live inside the root so a
//! scan never picks up files it has already routed.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ScanConfig;

pub fn discover_files(scan: &ScanConfig, skip_dirs: &[&Path]) -> Result<Vec<PathBuf>> {
    let root = &scan.import_dir;
    if !root.exists() {
        bail!("Import directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&scan.include_globs)?;

    let mut default_excludes = vec!["**/.*/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(scan.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let skip: Vec<PathBuf> = skip_dirs
        .iter()
        .filter_map(|d| d.canonicalize().ok())
        .collect();

    let mut paths = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(scan.follow_symlinks)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() || skip.is_empty() {
                return true;
            }
            match entry.path().canonicalize() {
                Ok(dir) => !skip.iter().any(|s| *s == dir),
                Err(_) => true,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        paths.push(path.to_path_buf());
    }

    paths.sort();

    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
