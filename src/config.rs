use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::normalize::normalize_language;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/booksing.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Discovery root.
    #[serde(default = "default_import_dir")]
    pub import_dir: PathBuf,
    /// Quarantine directory for unparseable and rejected files.
    #[serde(default = "default_fail_dir")]
    pub fail_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Maximum parses in flight. 0 means the number of available CPUs.
    #[serde(default)]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Largest accepted file in bytes. 0 means unlimited.
    #[serde(default)]
    pub max_size: u64,
    /// Empty accepts every language.
    #[serde(default)]
    pub accepted_languages: Vec<String>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_parse_timeout_secs")]
    pub parse_timeout_secs: u64,
    /// Remove a file from the import directory when its identity is already cataloged.
    #[serde(default)]
    pub delete_duplicates: bool,
}

fn default_import_dir() -> PathBuf {
    PathBuf::from("./import")
}
fn default_fail_dir() -> PathBuf {
    PathBuf::from("./failed")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.epub".to_string()]
}
fn default_batch_size() -> usize {
    50
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_parse_timeout_secs() -> u64 {
    30
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            import_dir: default_import_dir(),
            fail_dir: default_fail_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            concurrency: 0,
            batch_size: default_batch_size(),
            max_size: 0,
            accepted_languages: Vec::new(),
            interval_secs: default_interval_secs(),
            parse_timeout_secs: default_parse_timeout_secs(),
            delete_duplicates: false,
        }
    }
}

impl ScanConfig {
    /// Concurrency bound with `0` resolved to the CPU count.
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency > 0 {
            self.concurrency
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub kind: StorageKind,
    /// When set, accepted files are moved into this directory using the
    /// `<initial>/<Author>/<Author>-<Title>.epub` layout.
    #[serde(default)]
    pub library_dir: Option<PathBuf>,
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7132".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConvertConfig {
    #[serde(default = "default_convert_command")]
    pub command: String,
}

fn default_convert_command() -> String {
    "ebook-convert".to_string()
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            command: default_convert_command(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.scan.batch_size == 0 {
        anyhow::bail!("scan.batch_size must be > 0");
    }
    if config.scan.interval_secs == 0 {
        anyhow::bail!("scan.interval_secs must be > 0");
    }
    if config.scan.parse_timeout_secs == 0 {
        anyhow::bail!("scan.parse_timeout_secs must be > 0");
    }
    if config.storage.kind == StorageKind::S3 && config.storage.s3.is_none() {
        anyhow::bail!("storage.kind = \"s3\" requires a [storage.s3] section");
    }

    config.scan.accepted_languages = config
        .scan
        .accepted_languages
        .iter()
        .map(|l| normalize_language(l))
        .collect();

    Ok(config)
}
