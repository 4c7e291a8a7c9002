use std::fs;

use anyhow::Result;
use assert_cmd::cargo::cargo_bin_cmd;
use harvestry_core::orchestration::TrailingIncremental;
use harvestryctl::config::{ConfigLoadError, ConfigLoader, EnvConfig};
use predicates::prelude::*;

#[test]
fn file_values_are_layered_under_env() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("harvestry.toml");
    fs::write(
        &path,
        r#"
            [database]
            url = "postgres://file@localhost/harvestry"

            [process]
            trailing_incremental = "enqueue"
            export_after_promotion = false

            [validation]
            min_public_count = 500
        "#,
    )?;

    let env = EnvConfig {
        database_url: Some("postgres://env@db/harvestry".into()),
        min_public_count: Some(750),
        ..EnvConfig::default()
    };
    let load = ConfigLoader::new().with_config_path(&path).load_with_env(env)?;

    let config = load.config;
    assert_eq!(config.metadata.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(
        config.database.as_ref().map(|db| db.url.username()),
        Some("env")
    );
    assert_eq!(config.pipeline.validation.min_public_count, 750);
    assert_eq!(
        config.pipeline.process.trailing_incremental,
        TrailingIncremental::Enqueue
    );
    assert!(!config.pipeline.process.export_after_promotion);
    assert!(load.warnings.is_empty());
    Ok(())
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("absent.toml"))
        .load_with_env(EnvConfig::default())
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_file_reports_parse_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("harvestry.toml");
    fs::write(&path, "[validation]\nmin_public_count = \"many\"\n")?;

    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::Parse { .. }));
    Ok(())
}

#[test]
fn guard_rail_violation_fails_the_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("harvestry.toml");
    fs::write(&path, "[retry]\nmax_attempts = 0\n")?;

    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::GuardRail(_)));
    Ok(())
}

#[test]
fn config_check_strict_fails_on_warnings() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("harvestry.toml");
    fs::write(&path, "[process]\ntrailing_incremental = \"off\"\n")?;

    let mut cmd = cargo_bin_cmd!("harvestryctl");
    cmd.current_dir(dir.path())
        .env_remove("DATABASE_URL")
        .env_remove("HARVESTRY_TRAILING_INCREMENTAL")
        .arg("--config")
        .arg(&path)
        .arg("config")
        .arg("check")
        .arg("--strict")
        .assert()
        .failure()
        .stdout(predicate::str::contains("warning: Trailing incremental is off"));
    Ok(())
}
