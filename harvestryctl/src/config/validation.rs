use harvestry_core::orchestration::TrailingIncremental;
use thiserror::Error;

use super::loader::Config;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("{field} {reason}")]
    OutOfRange { field: &'static str, reason: String },
}

impl ConfigGuardRailError {
    fn out_of_range(field: &'static str, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

/// Reject settings the pipeline cannot run with and flag the merely risky ones.
pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let pipeline = &config.pipeline;
    let mut warnings = ConfigWarnings::default();

    let validation = &pipeline.validation;
    if validation.regression_tolerance_percent > 100 {
        return Err(ConfigGuardRailError::out_of_range(
            "validation.regression_tolerance_percent",
            format!("is {} but must be between 0 and 100", validation.regression_tolerance_percent),
        ));
    }
    if !(validation.max_disk_usage_percent > 0.0 && validation.max_disk_usage_percent <= 100.0) {
        return Err(ConfigGuardRailError::out_of_range(
            "validation.max_disk_usage_percent",
            format!("is {} but must be in (0, 100]", validation.max_disk_usage_percent),
        ));
    }

    let retry = &pipeline.retry;
    if retry.max_attempts == 0 {
        return Err(ConfigGuardRailError::out_of_range(
            "retry.max_attempts",
            "must allow at least one attempt",
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter_ratio) {
        return Err(ConfigGuardRailError::out_of_range(
            "retry.jitter_ratio",
            format!("is {} but must be between 0 and 1", retry.jitter_ratio),
        ));
    }
    if retry.backoff_base_ms > retry.backoff_max_ms {
        return Err(ConfigGuardRailError::out_of_range(
            "retry.backoff_base_ms",
            format!("exceeds retry.backoff_max_ms ({})", retry.backoff_max_ms),
        ));
    }

    let process = &pipeline.process;
    if process.precondition_concurrency == 0 {
        return Err(ConfigGuardRailError::out_of_range(
            "process.precondition_concurrency",
            "must be at least 1",
        ));
    }
    if process.duplicate_batch_size == 0 {
        return Err(ConfigGuardRailError::out_of_range(
            "process.duplicate_batch_size",
            "must be at least 1",
        ));
    }
    if pipeline.index.shards == 0 {
        return Err(ConfigGuardRailError::out_of_range(
            "index.shards",
            "must be at least 1",
        ));
    }

    if config.database.is_none() {
        warnings.push_with_hint(
            "DATABASE_URL not configured; run state cannot be inspected with `status`",
            "Set DATABASE_URL or add a [database] section to harvestry.toml",
        );
    }

    if process.trailing_incremental == TrailingIncremental::Off {
        warnings.push_with_hint(
            "Trailing incremental is off; records harvested during a Full rebuild wait for the next incremental run",
            "Use trailing_incremental = \"inline\" or \"enqueue\" under [process]",
        );
    }

    if process.count_timeout_secs == 0 {
        warnings.push(
            "process.count_timeout_secs is 0; validation may read partition counts before the index has caught up",
        );
    }

    if validation.min_public_count == 0 {
        warnings.push("validation.min_public_count is 0; an empty candidate can be promoted");
    }

    if pipeline.harvest.cool_down_secs == 0 {
        warnings.push("harvest.cool_down_secs is 0; every Full run re-harvests all providers");
    }

    Ok(warnings)
}
