//! # booksing CLI
//!
//! ```bash
//! booksing --config ./config/booksing.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `booksing init` | Create the SQLite catalog |
//! | `booksing scan` | Ingest every EPUB under the import directory once |
//! | `booksing serve` | Periodic refresh plus the JSON HTTP API |
//! | `booksing search "<query>"` | Search the catalog |
//! | `booksing get <hash>` | Show one book |
//! | `booksing exists <author> <title>` | Presence check by author and title |
//! | `booksing delete <hash>` | Delete a book and its stored assets |
//! | `booksing convert <hash>` | Convert a book's EPUB to MOBI |
//! | `booksing fetch <hash>` | Copy a stored asset to a local file |
//! | `booksing stats` | Catalog size and recent refreshes |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use booksing::progress::ProgressMode;
use booksing::{book_cmd, config, ingest, migrate, search, server, stats};

/// booksing: an EPUB catalog that ingests, deduplicates and serves books.
#[derive(Parser)]
#[command(name = "booksing", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/booksing.toml`.
    #[arg(long, global = true, default_value = "./config/booksing.toml")]
    config: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog database. Safe to run repeatedly.
    Init,

    /// Scan the import directory once and exit.
    ///
    /// Every discovered file ends up added, already present, duplicate,
    /// invalid (quarantined), failed or cancelled. Ctrl-C stops the scan.
    Scan {
        /// Progress on stderr: `off`, `human` or `json`. Defaults to
        /// `human` on a terminal, `off` otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Run the periodic refresh loop and the HTTP API.
    Serve,

    /// Search by title and author. Terms match exactly, then phonetically.
    Search {
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Print the result page as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show one book by identity hash.
    Get {
        hash: String,

        #[arg(long)]
        json: bool,
    },

    /// Check whether a book is cataloged. Exits 1 when absent.
    Exists { author: String, title: String },

    /// Delete a book's stored assets and its catalog entry.
    Delete { hash: String },

    /// Convert a book's EPUB to MOBI with the configured command.
    Convert { hash: String },

    /// Copy a stored asset to a local file.
    Fetch {
        hash: String,

        /// Format to fetch (`epub` or `mobi`).
        #[arg(long, default_value = "epub")]
        tag: String,

        /// Output path. Defaults to `<Author>-<Title>.<tag>` in the current
        /// directory.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Catalog size and recent refresh history.
    Stats {
        /// Number of refreshes to list.
        #[arg(long, default_value_t = 10)]
        history: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Catalog initialized at {}", cfg.db.path.display());
        }
        Commands::Scan { progress } => {
            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(s) => ProgressMode::parse(s).ok_or_else(|| {
                    anyhow::anyhow!("Invalid --progress '{}'. Use off, human or json.", s)
                })?,
            };
            ingest::run_scan(&cfg, mode).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Search {
            query,
            limit,
            offset,
            json,
        } => {
            search::run_search(&cfg, &query, limit, offset, json).await?;
        }
        Commands::Get { hash, json } => {
            book_cmd::run_get(&cfg, &hash, json).await?;
        }
        Commands::Exists { author, title } => {
            book_cmd::run_exists(&cfg, &author, &title).await?;
        }
        Commands::Delete { hash } => {
            book_cmd::run_delete(&cfg, &hash).await?;
        }
        Commands::Convert { hash } => {
            book_cmd::run_convert(&cfg, &hash).await?;
        }
        Commands::Fetch { hash, tag, output } => {
            book_cmd::run_fetch(&cfg, &hash, &tag, output.as_deref()).await?;
        }
        Commands::Stats { history } => {
            stats::run_stats(&cfg, history).await?;
        }
    }

    Ok(())
}
