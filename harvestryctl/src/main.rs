//! `harvestryctl` entry point.

use anyhow::Context;
use clap::Parser;
use harvestryctl::cli::{Cli, Command, ConfigCommand};
use harvestryctl::commands;
use harvestryctl::config::{ConfigLoader, ConfigLoaderOptions};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let load = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config.clone(),
        env_file: cli.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,sqlx=warn,harvestry_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if load.config.metadata.env_file_loaded {
        info!("loaded .env file");
    }

    match &cli.command {
        Command::Config(ConfigCommand::Check(args)) => commands::check::run(&load, args),
        Command::Demo(args) => {
            log_warnings(&load);
            commands::demo::run(&load.config, args).await
        }
        Command::Status(args) => {
            log_warnings(&load);
            commands::status::run(&load.config, args).await
        }
    }
}

fn log_warnings(load: &harvestryctl::config::ConfigLoad) {
    for warning in &load.warnings.items {
        match &warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }
}
