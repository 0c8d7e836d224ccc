mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use common::{write_epub, write_garbage};

fn booksing_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("booksing");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let import = root.join("import");
    write_epub(&import, "road.epub", "The Road", "Cormac McCarthy", "en");
    write_epub(&import, "hobbit.epub", "The Hobbit", "Tolkien, J.R.R.", "en");
    write_garbage(&import, "broken.epub");

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[db]
path = "{root}/data/booksing.sqlite"

[scan]
import_dir = "{root}/import"
fail_dir = "{root}/failed"
concurrency = 2
batch_size = 10

[storage]
kind = "local"
library_dir = "{root}/library"

[convert]
command = "cp"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("booksing.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_booksing(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = booksing_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run booksing binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_booksing(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_booksing(&config_path, &["init"]);
    assert!(success, "second init failed");
}

#[test]
fn scan_organizes_library_and_quarantines() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_booksing(&config_path, &["scan", "--progress", "off"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("discovered:      3"), "{}", stdout);
    assert!(stdout.contains("added:           2"), "{}", stdout);
    assert!(stdout.contains("invalid:         1"), "{}", stdout);

    let root = tmp.path();
    assert!(root
        .join("library/M/Cormac_Mccarthy/Cormac_Mccarthy-The_Road.epub")
        .exists());
    assert!(root.join("failed/broken.epub").exists());
    assert!(!root.join("import/road.epub").exists());

    // Nothing left to import.
    let (stdout, _, success) = run_booksing(&config_path, &["scan", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("discovered:      0"), "{}", stdout);
}

#[test]
fn search_get_and_exists() {
    let (_tmp, config_path) = setup_test_env();
    run_booksing(&config_path, &["scan", "--progress", "off"]);

    let (stdout, stderr, success) = run_booksing(&config_path, &["search", "hobbit"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("The Hobbit"), "{}", stdout);
    assert!(stdout.contains("of 1"), "{}", stdout);

    let (stdout, _, success) = run_booksing(&config_path, &["search", "hobbit", "--json"]);
    assert!(success);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hash = page["items"][0]["identity_hash"].as_str().unwrap().to_string();

    let (stdout, _, success) = run_booksing(&config_path, &["get", &hash]);
    assert!(success);
    assert!(stdout.contains("The Hobbit"));

    let (stdout, _, success) =
        run_booksing(&config_path, &["exists", "Cormac McCarthy", "The Road"]);
    assert!(success);
    assert!(stdout.starts_with("present"));

    let (stdout, _, success) =
        run_booksing(&config_path, &["exists", "Cormac McCarthy", "Blood Meridian"]);
    assert!(!success);
    assert!(stdout.starts_with("absent"));
}

#[test]
fn fetch_convert_and_delete() {
    let (tmp, config_path) = setup_test_env();
    run_booksing(&config_path, &["scan", "--progress", "off"]);

    let (stdout, _, _) = run_booksing(&config_path, &["search", "road", "--json"]);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hash = page["items"][0]["identity_hash"].as_str().unwrap().to_string();

    let out = tmp.path().join("out/road.epub");
    let (stdout, stderr, success) = run_booksing(
        &config_path,
        &["fetch", &hash, "--output", out.to_str().unwrap()],
    );
    assert!(success, "fetch failed: {}", stderr);
    assert!(stdout.contains("wrote"));
    assert!(out.exists());

    let (stdout, stderr, success) = run_booksing(&config_path, &["convert", &hash]);
    assert!(success, "convert failed: {}", stderr);
    assert!(stdout.contains("converted"));
    assert!(tmp
        .path()
        .join("library/M/Cormac_Mccarthy/Cormac_Mccarthy-The_Road.mobi")
        .exists());

    let (_, _, success) = run_booksing(&config_path, &["delete", &hash]);
    assert!(success);
    assert!(!tmp
        .path()
        .join("library/M/Cormac_Mccarthy/Cormac_Mccarthy-The_Road.epub")
        .exists());

    let (_, _, success) = run_booksing(&config_path, &["get", &hash]);
    assert!(!success);
}

#[test]
fn stats_lists_refreshes() {
    let (_tmp, config_path) = setup_test_env();
    run_booksing(&config_path, &["scan", "--progress", "off"]);

    let (stdout, stderr, success) = run_booksing(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Books:       2"), "{}", stdout);
    assert!(stdout.contains("Recent refreshes"));
}

#[test]
fn bad_progress_mode_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_booksing(&config_path, &["scan", "--progress", "loud"]);
    assert!(!success);
    assert!(stderr.contains("--progress"));
}
