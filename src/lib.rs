//! # booksing
//!
//! An EPUB catalog. Books dropped into an import directory are parsed,
//! normalized, fingerprinted, filtered by policy and indexed for search.
//! Invalid files are quarantined; duplicates are detected by identity hash.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │ import dir │──▶│ Scanner              │──▶│ SearchBackend │
//! │ (walkdir)  │   │ parse → normalize →  │   │ SQLite / mem  │
//! └────────────┘   │ policy → fingerprint │   └──────┬───────┘
//!                  └─────────┬────────────┘          │
//!                            ▼                  ┌────┴─────┐
//!                     ┌──────────────┐          ▼          ▼
//!                     │ AssetStorage │     ┌────────┐ ┌────────┐
//!                     │ local / S3   │     │  CLI   │ │  HTTP  │
//!                     └──────────────┘     └────────┘ └────────┘
//! ```
//!
//! A [`refresh::RefreshController`] runs the scanner periodically or on
//! demand, one scan at a time.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`models`] | Core data types |
//! | [`error`] | Typed ingestion errors |
//! | [`normalize`] | Author, title, language and description cleanup |
//! | [`fingerprint`] | Identity hash, phonetic keys, search tokens |
//! | [`extract`] | EPUB metadata extraction |
//! | [`connector_fs`] | Import directory discovery |
//! | [`policy`] | Size and language acceptance |
//! | [`ingest`] | Bounded scan pipeline |
//! | [`batch`] | Batched index writes |
//! | [`quarantine`] | Moves invalid files out of the import directory |
//! | [`refresh`] | Single-flight refresh controller |
//! | [`traits`] | Extractor, search and storage seams |
//! | [`store`] | Search backends |
//! | [`storage`] | Asset storage backends |
//! | [`library`] | Per-book operations |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema |

pub mod app;
pub mod batch;
pub mod book_cmd;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod ingest;
pub mod library;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod policy;
pub mod progress;
pub mod quarantine;
pub mod refresh;
pub mod search;
pub mod server;
pub mod stats;
pub mod storage;
pub mod store;
pub mod traits;
