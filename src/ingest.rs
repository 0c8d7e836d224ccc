//! Scan pipeline: discovery, bounded parsing, and a single collector.
//!
//! ```text
//!  feeder ──▶ task queue ──▶ C workers ──▶ result channel ──▶ collector ──▶ BatchWriter
//!  (paths)    (bounded)     parse/policy/       (bounded)       counters
//!                           fingerprint/store
//! ```
//!
//! Every discovered path produces exactly one [`Outcome`]. Parses run on
//! blocking threads and hold a semaphore permit for as long as they really
//! run, so a timed-out parse still occupies its slot until it returns. The
//! collector is the only place counters and the batch buffer are touched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::batch::BatchWriter;
use crate::config::{Config, ScanConfig};
use crate::connector_fs;
use crate::error::IngestError;
use crate::extract::load_candidate;
use crate::fingerprint::{compute_identity_hash, compute_phonetic_keys, compute_search_tokens};
use crate::models::{BookRecord, Candidate, RefreshResult, EPUB_TAG};
use crate::normalize::{normalize_language, normalize_name, sanitize_description};
use crate::policy::PolicyFilter;
use crate::progress::{NoProgress, ProgressMode, ScanProgressEvent, ScanProgressReporter};
use crate::quarantine::Quarantine;
use crate::refresh::RefreshController;
use crate::traits::{AssetStorage, MetadataExtractor, SearchBackend};

const PROGRESS_STRIDE: u64 = 25;
const LOG_STRIDE: u64 = 100;

/// Knobs of a single scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub concurrency: usize,
    pub batch_size: usize,
    pub parse_timeout: Duration,
    /// Remove a file whose identity is already in the backend.
    pub delete_duplicates: bool,
}

impl ScanOptions {
    pub fn from_config(scan: &ScanConfig) -> Self {
        Self {
            concurrency: scan.effective_concurrency(),
            batch_size: scan.batch_size,
            parse_timeout: scan.parse_timeout(),
            delete_duplicates: scan.delete_duplicates,
        }
    }
}

/// What happened to one discovered file.
#[derive(Debug)]
pub enum Outcome {
    /// Valid and new; still has to be flushed.
    Accepted(Box<BookRecord>),
    AlreadyPresent,
    Duplicate,
    /// Unreadable or not a valid container.
    Invalid,
    /// Refused by the policy filter.
    Rejected,
    /// Timed out or could not be stored.
    Failed,
    Cancelled,
}

/// Normalize a candidate and derive its identity hash and key sets.
pub fn build_record(candidate: &Candidate) -> BookRecord {
    let author = normalize_name(&candidate.author, true, true);
    let title = normalize_name(&candidate.title, true, false);
    let text = format!("{} {}", title, author);

    BookRecord {
        identity_hash: compute_identity_hash(&author, &title),
        language: normalize_language(&candidate.language),
        description: sanitize_description(&candidate.description),
        phonetic_keys: compute_phonetic_keys(&text),
        search_tokens: compute_search_tokens(&text),
        added_at: Utc::now(),
        locations: Default::default(),
        converted: false,
        title,
        author,
    }
}

/// Identity hashes claimed by files earlier in the same scan.
#[derive(Default)]
struct Claims(Mutex<HashSet<String>>);

impl Claims {
    fn guard(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns false when the hash was already claimed.
    fn claim(&self, hash: &str) -> bool {
        self.guard().insert(hash.to_string())
    }

    fn release(&self, hash: &str) {
        self.guard().remove(hash);
    }
}

struct Pipeline {
    extractor: Arc<dyn MetadataExtractor>,
    backend: Arc<dyn SearchBackend>,
    storage: Arc<dyn AssetStorage>,
    policy: PolicyFilter,
    quarantine: Quarantine,
    options: ScanOptions,
}

/// Runs full scans of the import directory.
#[derive(Clone)]
pub struct Scanner {
    pipeline: Arc<Pipeline>,
    scan: ScanConfig,
    skip_dirs: Vec<PathBuf>,
    progress: Arc<dyn ScanProgressReporter>,
}

impl Scanner {
    pub fn new(
        scan: ScanConfig,
        extractor: Arc<dyn MetadataExtractor>,
        backend: Arc<dyn SearchBackend>,
        storage: Arc<dyn AssetStorage>,
    ) -> Self {
        let pipeline = Pipeline {
            extractor,
            backend,
            storage,
            policy: PolicyFilter::from_config(&scan),
            quarantine: Quarantine::new(scan.fail_dir.clone()),
            options: ScanOptions::from_config(&scan),
        };
        Self {
            pipeline: Arc::new(pipeline),
            skip_dirs: vec![scan.fail_dir.clone()],
            scan,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, reporter: Arc<dyn ScanProgressReporter>) -> Self {
        self.progress = reporter;
        self
    }

    /// Never descend into `dir` during discovery.
    pub fn with_skip_dir(mut self, dir: PathBuf) -> Self {
        self.skip_dirs.push(dir);
        self
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.pipeline.backend
    }

    pub fn options(&self) -> &ScanOptions {
        &self.pipeline.options
    }

    /// Discover every file under the import directory and scan it.
    ///
    /// A discovery failure is logged and yields an empty result.
    pub async fn run(&self, cancel: &CancellationToken) -> RefreshResult {
        let started_at = Utc::now();
        self.progress.report(ScanProgressEvent::Discovering {
            root: self.scan.import_dir.display().to_string(),
        });

        let scan = self.scan.clone();
        let skip_dirs = self.skip_dirs.clone();
        let discovered = tokio::task::spawn_blocking(move || {
            let skip: Vec<&Path> = skip_dirs.iter().map(PathBuf::as_path).collect();
            connector_fs::discover_files(&scan, &skip)
        })
        .await;

        let paths = match discovered {
            Ok(Ok(paths)) => paths,
            Ok(Err(e)) => {
                let err = IngestError::Discovery(format!("{:#}", e));
                error!(import_dir = %self.scan.import_dir.display(), error = %err, "scan aborted");
                return finished(RefreshResult::started(started_at));
            }
            Err(e) => {
                let err = IngestError::Discovery(e.to_string());
                error!(error = %err, "scan aborted");
                return finished(RefreshResult::started(started_at));
            }
        };

        self.scan_paths_from(started_at, paths, cancel).await
    }

    /// Scan an explicit list of paths.
    pub async fn scan_paths(&self, paths: Vec<PathBuf>, cancel: &CancellationToken) -> RefreshResult {
        self.scan_paths_from(Utc::now(), paths, cancel).await
    }

    async fn scan_paths_from(
        &self,
        started_at: chrono::DateTime<Utc>,
        paths: Vec<PathBuf>,
        cancel: &CancellationToken,
    ) -> RefreshResult {
        let total = paths.len() as u64;
        let concurrency = self.pipeline.options.concurrency.max(1);
        info!(
            files = total,
            import_dir = %self.scan.import_dir.display(),
            concurrency,
            "scan started"
        );

        let (task_tx, task_rx) = async_channel::bounded::<PathBuf>(concurrency);
        let (result_tx, mut result_rx) = mpsc::channel::<Outcome>(concurrency);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let claims = Arc::new(Claims::default());

        let mut tasks = JoinSet::new();

        let feeder_cancel = cancel.clone();
        tasks.spawn(async move {
            for path in paths {
                tokio::select! {
                    biased;
                    _ = feeder_cancel.cancelled() => break,
                    sent = task_tx.send(path) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        for _ in 0..concurrency {
            let pipeline = self.pipeline.clone();
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let semaphore = semaphore.clone();
            let claims = claims.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                while let Ok(path) = task_rx.recv().await {
                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        permit = semaphore.clone().acquire_owned() => permit.ok(),
                    };
                    let outcome = match permit {
                        Some(permit) => pipeline.process(&claims, path, permit).await,
                        None if cancel.is_cancelled() => Outcome::Cancelled,
                        None => Outcome::Failed,
                    };
                    if result_tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        let mut result = RefreshResult::started(started_at);
        let mut batch = BatchWriter::new(self.pipeline.backend.clone(), self.pipeline.options.batch_size);
        let mut seen = 0u64;

        while let Some(outcome) = result_rx.recv().await {
            seen += 1;
            match outcome {
                Outcome::Accepted(record) => batch.push(*record).await,
                Outcome::AlreadyPresent => result.already_present += 1,
                Outcome::Duplicate => result.duplicate += 1,
                Outcome::Invalid => result.invalid += 1,
                Outcome::Rejected => {
                    result.invalid += 1;
                    result.rejected += 1;
                }
                Outcome::Failed => result.failed += 1,
                Outcome::Cancelled => result.cancelled += 1,
            }

            if seen % LOG_STRIDE == 0 {
                debug!(processed = seen, total, "scan progress");
            }
            if seen % PROGRESS_STRIDE == 0 || seen == total {
                self.progress
                    .report(ScanProgressEvent::Processing { n: seen, total });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "scan task panicked");
            }
        }

        // Paths the feeder never handed out (stop requested) or whose worker died.
        let missing = total.saturating_sub(seen);
        if missing > 0 {
            if cancel.is_cancelled() {
                result.cancelled += missing;
            } else {
                result.failed += missing;
            }
        }

        let tally = batch.finish().await;
        result.added = tally.written;
        result.failed += tally.lost;

        let result = finished(result);
        info!(
            id = %result.id,
            added = result.added,
            already_present = result.already_present,
            duplicate = result.duplicate,
            invalid = result.invalid,
            rejected = result.rejected,
            failed = result.failed,
            cancelled = result.cancelled,
            "scan finished"
        );
        result
    }
}

/// One scan from the CLI (`booksing scan`). Ctrl-C stops it; files not yet
/// processed are reported as cancelled.
pub async fn run_scan(config: &Config, progress: ProgressMode) -> anyhow::Result<()> {
    let app = App::open(config).await?;
    let scanner = app.scanner().with_progress(Arc::from(progress.reporter()));
    let controller = Arc::new(RefreshController::new(scanner, config.scan.interval()));

    let stopper = controller.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });
    let result = controller.refresh().await?;
    ctrl_c.abort();

    println!("scan {}", config.scan.import_dir.display());
    println!("  discovered:      {}", result.total());
    println!("  added:           {}", result.added);
    println!("  already present: {}", result.already_present);
    println!("  duplicates:      {}", result.duplicate);
    println!("  invalid:         {} ({} rejected by policy)", result.invalid, result.rejected);
    println!("  failed:          {}", result.failed);
    if result.cancelled > 0 {
        println!("  cancelled:       {}", result.cancelled);
    }
    println!(
        "  took:            {:.1}s",
        (result.stopped_at - result.started_at).num_milliseconds() as f64 / 1000.0
    );
    println!("ok");
    Ok(())
}

fn finished(mut result: RefreshResult) -> RefreshResult {
    result.stopped_at = Utc::now();
    result
}

impl Pipeline {
    /// Extract, normalize, filter, fingerprint, dedup and store one file.
    async fn process(&self, claims: &Claims, path: PathBuf, permit: OwnedSemaphorePermit) -> Outcome {
        let extractor = self.extractor.clone();
        let parse_path = path.clone();
        let parse = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            load_candidate(extractor.as_ref(), &parse_path)
        });

        let candidate = match tokio::time::timeout(self.options.parse_timeout, parse).await {
            Ok(Ok(Ok(candidate))) => candidate,
            Ok(Ok(Err(source))) => {
                let err = IngestError::Parse {
                    path: path.clone(),
                    source,
                };
                warn!(file = %path.display(), error = %err, "parse failed");
                self.quarantine.route(&path).await;
                return Outcome::Invalid;
            }
            Ok(Err(join_err)) => {
                warn!(file = %path.display(), error = %join_err, "parser panicked");
                self.quarantine.route(&path).await;
                return Outcome::Invalid;
            }
            Err(_) => {
                warn!(
                    file = %path.display(),
                    timeout_secs = self.options.parse_timeout.as_secs_f64(),
                    "parse timed out"
                );
                return Outcome::Failed;
            }
        };

        if let Err(reason) = self.policy.check(&candidate) {
            let err = IngestError::PolicyRejection {
                path: path.clone(),
                reason,
            };
            info!(file = %path.display(), reason = %err, "rejected by policy");
            self.quarantine.route(&path).await;
            return Outcome::Rejected;
        }

        let mut record = build_record(&candidate);
        let hash = record.identity_hash.clone();

        match self.backend.get_by_hash(&hash).await {
            Ok(Some(existing)) => {
                if existing.is_stored_at(&path) {
                    return Outcome::AlreadyPresent;
                }
                let dup = IngestError::DuplicateIdentity {
                    hash: hash.clone(),
                    path: path.clone(),
                };
                debug!(error = %dup, "duplicate");
                if self.options.delete_duplicates {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => info!(file = %path.display(), hash = %hash, "deleted duplicate"),
                        Err(e) => warn!(file = %path.display(), error = %e, "cannot delete duplicate"),
                    }
                }
                return Outcome::Duplicate;
            }
            Ok(None) => {}
            Err(e) => {
                let msg = format!("{:#}", e);
                error!(file = %path.display(), error = %msg, "backend lookup failed");
                return Outcome::Failed;
            }
        }

        // Not cataloged yet: the first file of this scan to claim the
        // identity wins. The winner's record may still be lost, so a losing
        // file is kept on disk.
        if !claims.claim(&hash) {
            debug!(file = %path.display(), hash = %hash, "identity already claimed in this scan");
            return Outcome::Duplicate;
        }

        match self.storage.store(&path, &record).await {
            Ok(location) => {
                record.locations.insert(EPUB_TAG.to_string(), location);
                Outcome::Accepted(Box::new(record))
            }
            Err(e) => {
                claims.release(&hash);
                let msg = format!("{:#}", e);
                error!(file = %path.display(), error = %msg, "storing asset failed");
                Outcome::Failed
            }
        }
    }
}
