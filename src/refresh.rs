//! Refresh controller: a single-flight `idle | indexing` state machine.
//!
//! Scans are started by a periodic timer ([`RefreshController::run`]) or on
//! demand ([`RefreshController::trigger`]). The `idle -> indexing`
//! transition is a compare-and-swap on an atomic flag owned by the
//! controller; a trigger that loses the race is logged and dropped, never
//! queued. The flag is cleared by a guard on drop, so the controller always
//! returns to `idle`, whether the scan finished, failed or panicked.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::IngestError;
use crate::ingest::Scanner;
use crate::models::RefreshResult;

/// Results kept in memory for [`RefreshController::history`].
pub const HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Indexing,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub last: Option<RefreshResult>,
}

/// Owns the `indexing` state: holds the scan's stop token and, when
/// dropped, clears it and the running flag.
struct FlightGuard {
    running: Arc<AtomicBool>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    token: CancellationToken,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        *lock(&self.current) = None;
        self.running.store(false, Ordering::Release);
    }
}

pub struct RefreshController {
    scanner: Scanner,
    interval: Duration,
    running: Arc<AtomicBool>,
    history: Mutex<VecDeque<RefreshResult>>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RefreshController {
    pub fn new(scanner: Scanner, interval: Duration) -> Self {
        Self {
            scanner,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            history: Mutex::new(VecDeque::new()),
            current: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RefreshState {
        if self.running.load(Ordering::Acquire) {
            RefreshState::Indexing
        } else {
            RefreshState::Idle
        }
    }

    pub fn last_result(&self) -> Option<RefreshResult> {
        lock(&self.history).back().cloned()
    }

    pub fn status(&self) -> RefreshStatus {
        RefreshStatus {
            state: self.state(),
            last: self.last_result(),
        }
    }

    /// Results of this process's scans, newest first.
    pub fn history(&self, limit: usize) -> Vec<RefreshResult> {
        lock(&self.history).iter().rev().take(limit).cloned().collect()
    }

    fn try_begin(&self) -> Result<FlightGuard, IngestError> {
        match self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                let token = self.shutdown.child_token();
                *lock(&self.current) = Some(token.clone());
                Ok(FlightGuard {
                    running: self.running.clone(),
                    current: self.current.clone(),
                    token,
                })
            }
            Err(_) => {
                warn!("refresh already running, trigger dropped");
                Err(IngestError::RefreshAlreadyRunning)
            }
        }
    }

    /// Run one scan to completion on the current task.
    pub async fn refresh(&self) -> Result<RefreshResult, IngestError> {
        let guard = self.try_begin()?;
        Ok(self.run_scan(guard).await)
    }

    /// Start a scan in the background and return immediately.
    pub fn trigger(self: &Arc<Self>) -> Result<(), IngestError> {
        let guard = self.try_begin()?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_scan(guard).await;
        });
        Ok(())
    }

    /// Cancel the scan in progress. Returns false when idle.
    pub fn stop(&self) -> bool {
        match lock(&self.current).as_ref() {
            Some(token) => {
                info!("stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop the periodic loop and any scan in progress.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn run_scan(&self, guard: FlightGuard) -> RefreshResult {
        let result = self.scanner.run(&guard.token).await;

        {
            let mut history = lock(&self.history);
            history.push_back(result.clone());
            while history.len() > HISTORY_LIMIT {
                history.pop_front();
            }
        }
        if let Err(e) = self.scanner.backend().record_refresh(&result).await {
            let msg = format!("{:#}", e);
            error!(id = %result.id, error = %msg, "cannot persist refresh result");
        }

        drop(guard);
        result
    }

    /// Periodic loop. The first scan starts immediately; runs until
    /// [`shutdown`](Self::shutdown) is called.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "refresh loop started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    // A collision was already logged by try_begin.
                    let _ = self.refresh().await;
                }
            }
        }
        info!("refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::extract::EpubExtractor;
    use crate::storage::LocalStorage;
    use crate::store::MemoryBackend;

    fn controller(root: &std::path::Path) -> Arc<RefreshController> {
        let scan = ScanConfig {
            import_dir: root.join("import"),
            fail_dir: root.join("failed"),
            concurrency: 1,
            ..ScanConfig::default()
        };
        std::fs::create_dir_all(&scan.import_dir).unwrap();
        let scanner = Scanner::new(
            scan,
            Arc::new(EpubExtractor),
            Arc::new(MemoryBackend::new()),
            Arc::new(LocalStorage::new(None)),
        );
        Arc::new(RefreshController::new(scanner, Duration::from_secs(3600)))
    }

    #[test]
    fn single_flight_flag() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(dir.path());
        let guard = c.try_begin().unwrap();
        assert_eq!(c.state(), RefreshState::Indexing);
        assert!(matches!(
            c.try_begin(),
            Err(IngestError::RefreshAlreadyRunning)
        ));
        drop(guard);
        assert_eq!(c.state(), RefreshState::Idle);
        assert!(c.try_begin().is_ok());
    }

    #[test]
    fn stop_is_available_as_soon_as_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(dir.path());
        let guard = c.try_begin().unwrap();
        assert!(c.stop());
        assert!(guard.token.is_cancelled());
        drop(guard);
        assert!(!c.stop());
    }

    #[tokio::test]
    async fn panicking_scan_still_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(dir.path());
        let guard = c.try_begin().unwrap();
        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("scan blew up");
        });
        assert!(task.await.is_err());
        assert_eq!(c.state(), RefreshState::Idle);
        assert!(!c.stop());
    }

    #[tokio::test]
    async fn refresh_records_history_and_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(dir.path());

        let result = c.refresh().await.unwrap();
        assert_eq!(result.total(), 0);
        assert_eq!(c.state(), RefreshState::Idle);
        assert_eq!(c.history(10).len(), 1);
        assert_eq!(c.last_result().unwrap().id, result.id);
        assert_eq!(
            c.scanner.backend().refreshes(10).await.unwrap()[0].id,
            result.id
        );
        assert!(!c.stop());
    }

    #[tokio::test]
    async fn periodic_loop_runs_first_tick_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(dir.path());
        let handle = tokio::spawn(c.clone().run());

        for _ in 0..100 {
            if !c.history(1).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(c.history(10).len(), 1);

        c.shutdown();
        handle.await.unwrap();
    }
}
