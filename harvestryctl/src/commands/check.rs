use std::fmt::Write as _;

use anyhow::{Context, Result, bail};

use crate::cli::CheckArgs;
use crate::config::ConfigLoad;

pub fn run(load: &ConfigLoad, args: &CheckArgs) -> Result<()> {
    print!("{}", render(load)?);

    if args.strict && !load.warnings.is_empty() {
        bail!(
            "{} configuration warning(s) reported in strict mode",
            load.warnings.len()
        );
    }
    Ok(())
}

/// Human-readable summary of the resolved configuration.
pub fn render(load: &ConfigLoad) -> Result<String> {
    let config = &load.config;
    let mut out = String::new();

    let source = config
        .metadata
        .config_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<defaults>".into());
    writeln!(out, "config file: {source}")?;
    writeln!(out, "env file loaded: {}", config.metadata.env_file_loaded)?;
    match &config.database {
        Some(db) => writeln!(
            out,
            "database: {} (max {} connections)",
            db.redacted(),
            db.max_connections
        )?,
        None => writeln!(out, "database: <not configured>")?,
    }

    let pipeline =
        toml::to_string_pretty(&config.pipeline).context("failed to render pipeline config")?;
    writeln!(out, "\n{pipeline}")?;

    if load.warnings.is_empty() {
        writeln!(out, "no warnings")?;
    } else {
        for warning in &load.warnings.items {
            writeln!(out, "warning: {}", warning.message)?;
            if let Some(hint) = &warning.hint {
                writeln!(out, "  hint: {hint}")?;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLoader, EnvConfig};

    #[test]
    fn render_masks_password_and_lists_warnings() {
        let env = EnvConfig {
            database_url: Some("postgres://ops:hunter2@db/harvestry".into()),
            trailing_incremental: Some("off".into()),
            ..EnvConfig::default()
        };
        let load = ConfigLoader::new()
            .with_config_path(concat!(env!("CARGO_MANIFEST_DIR"), "/harvestry.example.toml"))
            .load_with_env(env)
            .unwrap();

        let text = render(&load).unwrap();

        assert!(text.contains("postgres://ops:****@db/harvestry"));
        assert!(!text.contains("hunter2"));
        assert!(text.contains("[validation]"));
        assert!(text.contains("warning: Trailing incremental is off"));
    }
}
