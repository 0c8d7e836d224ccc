//! Scan progress reporting.
//!
//! Progress is emitted on **stderr** so stdout stays parseable for scripts.
//! The scanner reports discovery once, then `processing n / total` from the
//! collector at a fixed stride and on the last file.

use std::io::Write;

/// A single progress event for a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanProgressEvent {
    /// Walking the import directory. Total unknown.
    Discovering { root: String },
    /// `n` of `total` discovered files have produced an outcome.
    Processing { n: u64, total: u64 },
}

pub trait ScanProgressReporter: Send + Sync {
    fn report(&self, event: ScanProgressEvent);
}

/// Human-friendly progress on stderr: "scan  processing  1,234 / 5,000 files".
pub struct StderrProgress;

impl ScanProgressReporter for StderrProgress {
    fn report(&self, event: ScanProgressEvent) {
        let line = match &event {
            ScanProgressEvent::Discovering { root } => {
                format!("scan {}  discovering...\n", root)
            }
            ScanProgressEvent::Processing { n, total } => format!(
                "scan  processing  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ScanProgressReporter for JsonProgress {
    fn report(&self, event: ScanProgressEvent) {
        let obj = match &event {
            ScanProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root
            }),
            ScanProgressEvent::Processing { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl ScanProgressReporter for NoProgress {
    fn report(&self, _event: ScanProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn ScanProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
