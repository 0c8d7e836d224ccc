//! Catalog summary and refresh history (`booksing stats`).

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::app::App;
use crate::config::Config;
use crate::models::RefreshResult;

pub async fn run_stats(config: &Config, history: usize) -> Result<()> {
    let app = App::open(config).await?;
    let count = app.backend.count().await?;
    let refreshes = app.backend.refreshes(history).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("booksing catalog");
    println!("================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Books:       {}", count);
    println!("  Import dir:  {}", config.scan.import_dir.display());
    println!("  Quarantine:  {}", config.scan.fail_dir.display());

    if !refreshes.is_empty() {
        println!();
        println!("  Recent refreshes:");
        println!(
            "  {:<18} {:>8} {:>7} {:>7} {:>7} {:>8} {:>6} {:>9}",
            "STARTED", "DURATION", "ADDED", "PRESENT", "DUPES", "INVALID", "FAILED", "CANCELLED"
        );
        println!("  {}", "-".repeat(82));
        for r in &refreshes {
            print_refresh(r);
        }
    }

    println!();
    Ok(())
}

fn print_refresh(r: &RefreshResult) {
    println!(
        "  {:<18} {:>8} {:>7} {:>7} {:>7} {:>8} {:>6} {:>9}",
        format_relative(r.started_at),
        format_duration((r.stopped_at - r.started_at).num_seconds()),
        r.added,
        r.already_present,
        r.duplicate,
        r.invalid,
        r.failed,
        r.cancelled
    );
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// "3 hours ago" style timestamp, falling back to a date after 30 days.
fn format_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn bytes_and_durations() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(125), "2m05s");
        assert_eq!(format_duration(7260), "2h01m");
    }

    #[test]
    fn relative_times() {
        assert_eq!(format_relative(Utc::now()), "just now");
        assert_eq!(format_relative(Utc::now() - Duration::hours(3)), "3 hours ago");
        assert_eq!(format_relative(Utc::now() - Duration::days(1)), "1 day ago");
    }
}
