use std::path::PathBuf;

use harvestry_core::orchestration::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Raw configuration as written in `harvestry.toml`.
///
/// Pipeline sections (`[harvest]`, `[process]`, `[validation]`, `[retry]`,
/// `[index]`) sit at the top level next to `[database]`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

/// Environment-derived configuration values.
///
/// Durations and enums stay raw here; the loader parses them so a typo is
/// reported instead of silently ignored.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub harvest_cool_down: Option<String>,
    pub count_timeout: Option<String>,
    pub trailing_incremental: Option<String>,
    pub export_after_promotion: Option<bool>,
    pub min_public_count: Option<u64>,
    pub regression_tolerance_percent: Option<u8>,
    pub retry_max_attempts: Option<u16>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var("HARVESTRY_CONFIG").map(PathBuf::from),
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: parsed_var("HARVESTRY_DATABASE_MAX_CONNECTIONS"),
            harvest_cool_down: non_empty_var("HARVESTRY_HARVEST_COOL_DOWN"),
            count_timeout: non_empty_var("HARVESTRY_COUNT_TIMEOUT"),
            trailing_incremental: non_empty_var("HARVESTRY_TRAILING_INCREMENTAL"),
            export_after_promotion: non_empty_var("HARVESTRY_EXPORT_AFTER_PROMOTION")
                .and_then(|raw| parse_bool(&raw)),
            min_public_count: parsed_var("HARVESTRY_MIN_PUBLIC_COUNT"),
            regression_tolerance_percent: parsed_var(
                "HARVESTRY_REGRESSION_TOLERANCE_PERCENT",
            ),
            retry_max_attempts: parsed_var("HARVESTRY_RETRY_MAX_ATTEMPTS"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_var(name).and_then(|raw| raw.parse().ok())
}

/// Parse a boolean value from a raw string, accepting common env-style forms.
///
/// Accepted truthy values (case-insensitive): `"1"`, `"true"`, `"yes"`, `"on"`.
/// Accepted falsy values: `"0"`, `"false"`, `"no"`, `"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_sections_sit_at_top_level() {
        let raw = r#"
            [database]
            url = "postgres://harvestry@localhost/harvestry"

            [validation]
            min_public_count = 250
            regression_tolerance_percent = 90

            [process]
            trailing_incremental = "enqueue"
        "#;

        let parsed: FileConfig = toml::from_str(raw).unwrap();

        assert_eq!(
            parsed.database.url.as_deref(),
            Some("postgres://harvestry@localhost/harvestry")
        );
        assert_eq!(parsed.pipeline.validation.min_public_count, 250);
        assert_eq!(parsed.pipeline.validation.regression_tolerance_percent, 90);
        assert_eq!(
            parsed.pipeline.process.trailing_incremental,
            harvestry_core::orchestration::TrailingIncremental::Enqueue
        );
        // Untouched sections keep their defaults.
        assert_eq!(parsed.pipeline.retry.max_attempts, 4);
    }

    #[test]
    fn bools_accept_env_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
