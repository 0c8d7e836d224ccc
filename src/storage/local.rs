//! Local file storage.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;

use crate::models::{BookRecord, Location};
use crate::traits::{AssetReader, AssetStorage};

static FILENAME_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9 -]+").unwrap());

/// Relative library path (without extension) for an author and title:
/// `<initial of last name>/<Author>/<Author>-<Title>` with spaces as `_`.
pub fn book_path(author: &str, title: &str) -> PathBuf {
    let author = FILENAME_UNSAFE.replace_all(author, "");
    let mut title = FILENAME_UNSAFE.replace_all(title, "").into_owned();
    if title.len() > 35 {
        title.truncate(30);
    }

    let mut author = author.trim().to_string();
    let mut title = title.trim().to_string();
    if author.is_empty() {
        author = "unknown".to_string();
    }
    if title.is_empty() {
        title = "unknown".to_string();
    }

    let initial: String = author
        .split(' ')
        .next_back()
        .and_then(|last| last.chars().next())
        .map(|c| c.to_string())
        .unwrap_or_else(|| "u".to_string());

    let underscore = |s: &str| s.replace(' ', "_").replace("__", "_");
    let author = underscore(&author);
    let title = underscore(&title);

    PathBuf::from(initial)
        .join(&author)
        .join(format!("{}-{}", author, title))
}

/// Stores assets on the local filesystem.
///
/// Without a library directory files stay where discovery found them. With
/// one, they are moved under [`book_path`], adding a numeric suffix when the
/// target name is already taken.
#[derive(Debug, Clone, Default)]
pub struct LocalStorage {
    library_dir: Option<PathBuf>,
}

impl LocalStorage {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    /// First candidate path for `record` under the library, before any
    /// collision suffix.
    fn base_for(library_dir: &Path, source: &Path, record: &BookRecord) -> (PathBuf, String) {
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "epub".to_string());
        (library_dir.join(book_path(&record.author, &record.title)), ext)
    }
}

#[async_trait]
impl AssetStorage for LocalStorage {
    async fn store(&self, path: &Path, record: &BookRecord) -> Result<Location> {
        let Some(library_dir) = &self.library_dir else {
            return Ok(Location::file(path));
        };

        let (base, ext) = Self::base_for(library_dir, path, record);
        if with_ext(&base, &ext) == path {
            return Ok(Location::file(path));
        }
        let (Some(dir), Some(stem)) = (base.parent(), base.file_name()) else {
            bail!("no library path for {}", path.display());
        };
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let target = reserve_path(dir, &stem.to_string_lossy(), &ext)
            .await
            .with_context(|| format!("Failed to reserve a name in {}", dir.display()))?;
        if let Err(e) = move_file(path, &target).await {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(e).with_context(|| {
                format!("Failed to move {} to {}", path.display(), target.display())
            });
        }

        Ok(Location::file(target))
    }

    async fn retrieve(&self, location: &Location) -> Result<AssetReader> {
        match location {
            Location::File { path } => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Ok(Box::new(file))
            }
            Location::ObjectStore { .. } => {
                bail!("local storage cannot read object store location {}", location)
            }
        }
    }

    async fn delete(&self, location: &Location) -> Result<()> {
        match location {
            Location::File { path } => remove_file_tolerant(path).await,
            Location::ObjectStore { .. } => {
                bail!("local storage cannot delete object store location {}", location)
            }
        }
    }
}

/// Remove a file, treating "not found" as success.
pub(crate) async fn remove_file_tolerant(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

fn with_ext(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    if !ext.is_empty() {
        name.push(".");
        name.push(ext);
    }
    PathBuf::from(name)
}

/// Create an empty placeholder at the first free name among `stem.ext`,
/// `stem-2.ext`, `stem-3.ext`, ... in `dir` and return its path.
///
/// `create_new` makes the claim atomic, so concurrent callers never get the
/// same path. The caller moves its file over the placeholder.
pub(crate) async fn reserve_path(dir: &Path, stem: &str, ext: &str) -> std::io::Result<PathBuf> {
    let mut n = 1u32;
    loop {
        let candidate = if n == 1 {
            with_ext(&dir.join(stem), ext)
        } else {
            with_ext(&dir.join(format!("{}-{}", stem, n)), ext)
        };
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Rename, falling back to copy and remove across filesystems. Replaces
/// whatever is at `to`.
pub(crate) async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) if tokio::fs::try_exists(from).await.unwrap_or(false) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};
    use tokio::io::AsyncReadExt;

    fn record(author: &str, title: &str) -> BookRecord {
        BookRecord {
            identity_hash: "h".to_string(),
            title: title.to_string(),
            author: author.to_string(),
            language: "en".to_string(),
            description: String::new(),
            phonetic_keys: BTreeSet::new(),
            search_tokens: BTreeSet::new(),
            added_at: Utc::now(),
            locations: BTreeMap::new(),
            converted: false,
        }
    }

    #[test]
    fn book_path_layout() {
        assert_eq!(
            book_path("J.R.R. Tolkien", "The Hobbit"),
            PathBuf::from("T/JRR_Tolkien/JRR_Tolkien-The_Hobbit")
        );
        assert_eq!(
            book_path("Anne Frank", "Het Achterhuis: dagboekbrieven 14 juni 1942"),
            PathBuf::from("F/Anne_Frank/Anne_Frank-Het_Achterhuis_dagboekbrieven")
        );
        assert_eq!(book_path("", "?"), PathBuf::from("u/unknown/unknown-unknown"));
    }

    #[tokio::test]
    async fn in_place_storage_keeps_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        std::fs::write(&path, b"data").unwrap();

        let storage = LocalStorage::new(None);
        let location = storage.store(&path, &record("A B", "C")).await.unwrap();
        assert_eq!(location, Location::file(&path));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn library_storage_moves_and_deduplicates_names() {
        let dir = tempfile::tempdir().unwrap();
        let library = dir.path().join("books");
        let storage = LocalStorage::new(Some(library.clone()));

        let first = dir.path().join("one.epub");
        let second = dir.path().join("two.epub");
        std::fs::write(&first, b"one").unwrap();
        std::fs::write(&second, b"two").unwrap();

        let loc1 = storage
            .store(&first, &record("Cormac McCarthy", "The Road"))
            .await
            .unwrap();
        let loc2 = storage
            .store(&second, &record("Cormac McCarthy", "The Road"))
            .await
            .unwrap();

        assert_eq!(
            loc1,
            Location::file(library.join("M/Cormac_McCarthy/Cormac_McCarthy-The_Road.epub"))
        );
        assert_eq!(
            loc2,
            Location::file(library.join("M/Cormac_McCarthy/Cormac_McCarthy-The_Road-2.epub"))
        );
        assert!(!first.exists());

        let mut content = String::new();
        storage
            .retrieve(&loc2)
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "two");
    }

    #[tokio::test]
    async fn concurrent_stores_never_share_a_target() {
        let dir = tempfile::tempdir().unwrap();
        let library = dir.path().join("books");
        let storage = std::sync::Arc::new(LocalStorage::new(Some(library.clone())));

        let mut handles = Vec::new();
        for i in 0..8 {
            let source = dir.path().join(format!("volume-{}.epub", i));
            std::fs::write(&source, format!("volume {}", i)).unwrap();
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                let title = format!("The Complete Works Of Anton Chekhov Volume {}", i);
                storage
                    .store(&source, &record("Anton Chekhov", &title))
                    .await
                    .unwrap()
            }));
        }

        let mut targets = BTreeSet::new();
        for handle in handles {
            let location = handle.await.unwrap();
            targets.insert(location.as_path().unwrap().to_path_buf());
        }
        assert_eq!(targets.len(), 8);

        let mut contents = BTreeSet::new();
        for target in &targets {
            contents.insert(std::fs::read_to_string(target).unwrap());
        }
        assert_eq!(contents.len(), 8);
        let shelf = library.join("C/Anton_Chekhov");
        assert_eq!(std::fs::read_dir(shelf).unwrap().count(), 8);
    }

    #[tokio::test]
    async fn reserve_path_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = reserve_path(dir.path(), "broken", "epub").await.unwrap();
        let second = reserve_path(dir.path(), "broken", "epub").await.unwrap();
        let bare = reserve_path(dir.path(), "README", "").await.unwrap();

        assert_eq!(first, dir.path().join("broken.epub"));
        assert_eq!(second, dir.path().join("broken-2.epub"));
        assert_eq!(bare, dir.path().join("README"));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        std::fs::write(&path, b"data").unwrap();
        let storage = LocalStorage::new(None);
        let location = Location::file(&path);

        storage.delete(&location).await.unwrap();
        assert!(!path.exists());
        storage.delete(&location).await.unwrap();
    }
}
