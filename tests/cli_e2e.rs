//! End-to-end CLI tests for the regscrape binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary isolated from any user config file.
fn regscrape(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("regscrape").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    regscrape(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download regulatory filings"))
        .stdout(predicate::str::contains("scrape-dockets"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    regscrape(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("regscrape"));
}

#[test]
fn test_binary_requires_subcommand() {
    let home = TempDir::new().unwrap();
    regscrape(&home).assert().failure();
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    regscrape(&home)
        .args(["download", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_out_of_range_worker_count_is_rejected() {
    let home = TempDir::new().unwrap();
    regscrape(&home)
        .args(["scrape-dockets", "-m", "65"])
        .assert()
        .failure();
}

// ==================== Command Tests ====================

#[test]
fn test_create_dockets_on_empty_database() {
    let home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db = data.path().join("regs.db");

    regscrape(&home)
        .args(["-q", "create-dockets", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Iterated over 0 dockets, of which 0 were new.",
        ));
    assert!(db.exists());
}

#[test]
fn test_reprocess_and_empty_passes_succeed() {
    let home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db = data.path().join("regs.db");

    regscrape(&home)
        .args(["-q", "reprocess", "-t", "pdf", "--db"])
        .arg(&db)
        .assert()
        .success();

    regscrape(&home)
        .args(["-q", "download", "--dry-run", "--db"])
        .arg(&db)
        .arg("--dir")
        .arg(data.path().join("downloads"))
        .assert()
        .success();

    regscrape(&home)
        .args(["-q", "decode", "--no-ocr", "--db"])
        .arg(&db)
        .assert()
        .success();
}

#[test]
fn test_config_file_is_validated() {
    let home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let config = data.path().join("config.toml");
    std::fs::write(&config, "[download]\nconcurrency = 0\n").unwrap();

    regscrape(&home)
        .args(["-q", "create-dockets", "--config"])
        .arg(&config)
        .arg("--db")
        .arg(data.path().join("regs.db"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();

    regscrape(&home)
        .args(["create-dockets", "--config"])
        .arg(data.path().join("absent.toml"))
        .assert()
        .failure();
}
