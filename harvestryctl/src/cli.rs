use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use harvestry_model::RunMode;

#[derive(Parser, Debug)]
#[command(name = "harvestryctl", version)]
#[command(about = "Operate the Harvestry observation publishing pipeline")]
pub struct Cli {
    /// Path to harvestry.toml (overrides HARVESTRY_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// .env file loaded before the environment is read
    #[arg(long, global = true, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive publish cycles against synthetic providers and an in-memory index
    Demo(DemoArgs),
    /// Show the live instance, run snapshots and harvest outcomes from Postgres
    Status(StatusArgs),
    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Run modes to execute in order (full, incremental-active, incremental-inactive)
    #[arg(
        long = "mode",
        value_name = "MODE",
        default_values = ["full", "incremental-active"]
    )]
    pub modes: Vec<RunMode>,

    /// Cancel the sequence after this long, e.g. `30s` or `2m`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub deadline: Option<Duration>,

    /// Emit the run reports as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Apply pending migrations before reading
    #[arg(long)]
    pub migrate: bool,

    /// How long to wait for a database connection
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub connect_timeout: Duration,

    /// Emit the status as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Resolve configuration and report guard-rail warnings
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Exit non-zero when any warning is reported
    #[arg(long)]
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn demo_defaults_to_full_then_incremental() {
        let cli = Cli::parse_from(["harvestryctl", "demo"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo command");
        };
        assert_eq!(
            args.modes,
            vec![RunMode::Full, RunMode::IncrementalActiveInstance]
        );
        assert!(args.deadline.is_none());
    }

    #[test]
    fn deadline_accepts_humantime() {
        let cli = Cli::parse_from([
            "harvestryctl",
            "demo",
            "--mode",
            "full",
            "--deadline",
            "1m 30s",
        ]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo command");
        };
        assert_eq!(args.modes, vec![RunMode::Full]);
        assert_eq!(args.deadline, Some(Duration::from_secs(90)));
    }
}
