use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn top_level_help_lists_commands() {
    let mut cmd = cargo_bin_cmd!("harvestryctl");
    let output = cmd
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("demo"), "help missing demo");
    assert!(text.contains("status"), "help missing status");
    assert!(text.contains("config"), "help missing config");
}

#[test]
fn demo_help_documents_modes_and_deadline() {
    let mut cmd = cargo_bin_cmd!("harvestryctl");
    cmd.arg("demo")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--mode"))
        .stdout(predicate::str::contains("--deadline"));
}

#[test]
fn unknown_mode_is_rejected() {
    let mut cmd = cargo_bin_cmd!("harvestryctl");
    cmd.arg("demo")
        .arg("--mode")
        .arg("weekly")
        .assert()
        .failure()
        .stderr(predicate::str::contains("weekly"));
}

#[test]
fn status_without_database_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("harvestryctl");
    cmd.current_dir(dir.path())
        .env_remove("DATABASE_URL")
        .env_remove("HARVESTRY_CONFIG")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL is not configured"));
}
