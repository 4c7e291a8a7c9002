use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use harvestry_core::orchestration::{PipelineConfig, TrailingIncremental};
use once_cell::sync::Lazy;
use url::Url;

use super::error::ConfigLoadError;
use super::sources::{EnvConfig, FileConfig, FileDatabaseConfig};
use super::validation::{self, ConfigWarnings};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("harvestry.toml"),
        PathBuf::from("config/harvestry.toml"),
    ]
});

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Fully resolved operator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    pub pipeline: PipelineConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Url,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// The connection URL with any password masked, for logs and output.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some("****"));
        }
        url.to_string()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provenance {
    Explicit,
    Env,
    Default,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, read the process environment and resolve the config file.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolve configuration against an already gathered environment.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let config_present = file_config.is_some();
        let file = file_config.unwrap_or_default();

        let mut warnings = ConfigWarnings::default();
        if !config_present {
            warnings.push_with_hint(
                "No harvestry.toml detected; using built-in pipeline defaults",
                "Pass --config or set HARVESTRY_CONFIG to point at a configuration file",
            );
        }

        let database = resolve_database(&env, file.database)?;
        let pipeline = apply_env_overrides(file.pipeline, &env)?;

        let config = Config {
            database,
            pipeline,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };
        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let resolved = if let Some(explicit) = &self.options.config_path {
            Some((explicit.clone(), Provenance::Explicit))
        } else if let Some(from_env) = &env.config_path {
            Some((from_env.clone(), Provenance::Env))
        } else {
            DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .map(|path| (path.clone(), Provenance::Default))
        };

        let Some((path, provenance)) = resolved else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance != Provenance::Default {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn resolve_database(
    env: &EnvConfig,
    file: FileDatabaseConfig,
) -> Result<Option<DatabaseConfig>, ConfigLoadError> {
    let Some(raw) = env.database_url.clone().or(file.url) else {
        return Ok(None);
    };

    let url = Url::parse(&raw).map_err(|source| ConfigLoadError::InvalidDatabaseUrl { source })?;
    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(ConfigLoadError::UnsupportedDatabaseScheme {
            scheme: url.scheme().to_string(),
        });
    }

    Ok(Some(DatabaseConfig {
        url,
        max_connections: env
            .database_max_connections
            .or(file.max_connections)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS),
    }))
}

fn apply_env_overrides(
    mut pipeline: PipelineConfig,
    env: &EnvConfig,
) -> Result<PipelineConfig, ConfigLoadError> {
    if let Some(raw) = &env.harvest_cool_down {
        pipeline.harvest.cool_down_secs =
            parse_duration("HARVESTRY_HARVEST_COOL_DOWN", raw)?.as_secs();
    }
    if let Some(raw) = &env.count_timeout {
        pipeline.process.count_timeout_secs =
            parse_duration("HARVESTRY_COUNT_TIMEOUT", raw)?.as_secs();
    }
    if let Some(raw) = &env.trailing_incremental {
        pipeline.process.trailing_incremental = parse_trailing(raw)?;
    }
    if let Some(export) = env.export_after_promotion {
        pipeline.process.export_after_promotion = export;
    }
    if let Some(min) = env.min_public_count {
        pipeline.validation.min_public_count = min;
    }
    if let Some(tolerance) = env.regression_tolerance_percent {
        pipeline.validation.regression_tolerance_percent = tolerance;
    }
    if let Some(attempts) = env.retry_max_attempts {
        pipeline.retry.max_attempts = attempts;
    }
    Ok(pipeline)
}

fn parse_duration(name: &'static str, raw: &str) -> Result<Duration, ConfigLoadError> {
    humantime::parse_duration(raw).map_err(|err| ConfigLoadError::InvalidEnv {
        name,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}

fn parse_trailing(raw: &str) -> Result<TrailingIncremental, ConfigLoadError> {
    match raw.to_ascii_lowercase().as_str() {
        "inline" => Ok(TrailingIncremental::Inline),
        "enqueue" => Ok(TrailingIncremental::Enqueue),
        "off" | "none" => Ok(TrailingIncremental::Off),
        _ => Err(ConfigLoadError::InvalidEnv {
            name: "HARVESTRY_TRAILING_INCREMENTAL",
            value: raw.to_string(),
            reason: "expected inline, enqueue or off".into(),
        }),
    }
}
