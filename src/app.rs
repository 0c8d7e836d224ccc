//! Wiring from [`Config`] to backends, scanner, controller and library.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::extract::EpubExtractor;
use crate::ingest::Scanner;
use crate::library::Library;
use crate::refresh::RefreshController;
use crate::store::SqliteBackend;
use crate::traits::{AssetStorage, SearchBackend};
use crate::{db, migrate, storage};

#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub backend: Arc<dyn SearchBackend>,
    pub storage: Arc<dyn AssetStorage>,
}

impl App {
    /// Connect to the configured database (creating the schema if needed)
    /// and build the storage backend.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let backend: Arc<dyn SearchBackend> = Arc::new(SqliteBackend::new(pool));
        let storage = storage::from_config(&config.storage)?;
        Ok(Self::with_parts(config.clone(), backend, storage))
    }

    pub fn with_parts(
        config: Config,
        backend: Arc<dyn SearchBackend>,
        storage: Arc<dyn AssetStorage>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            storage,
        }
    }

    pub fn scanner(&self) -> Scanner {
        let scanner = Scanner::new(
            self.config.scan.clone(),
            Arc::new(EpubExtractor),
            self.backend.clone(),
            self.storage.clone(),
        );
        match &self.config.storage.library_dir {
            Some(dir) => scanner.with_skip_dir(dir.clone()),
            None => scanner,
        }
    }

    pub fn controller(&self) -> Arc<RefreshController> {
        Arc::new(RefreshController::new(
            self.scanner(),
            self.config.scan.interval(),
        ))
    }

    pub fn library(&self) -> Library {
        Library::new(
            self.backend.clone(),
            self.storage.clone(),
            self.config.convert.command.clone(),
        )
    }
}
