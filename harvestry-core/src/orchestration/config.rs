use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global knobs that tune the publish pipeline.
///
/// All sections carry defaults so a deployment only has to spell out the
/// values it wants to change.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cohort selection for observation harvesting.
    pub harvest: HarvestConfig,
    /// Preconditions, bulk loading and post-processing of Full runs.
    pub process: ProcessConfig,
    /// Thresholds the candidate instance must meet before promotion.
    pub validation: ValidationConfig,
    /// Retry/backoff policy for transient storage errors.
    pub retry: RetryConfig,
    /// Schema used when a Full run recreates the target instance.
    pub index: IndexSchema,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Minimum time between the end of a provider's last successful harvest
    /// and its next scheduled Full harvest. Zero disables the cool-down.
    pub cool_down_secs: u64,
}

impl HarvestConfig {
    pub fn cool_down(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cool_down_secs.min(i64::MAX as u64) as i64)
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            cool_down_secs: 6 * 60 * 60,
        }
    }
}

/// What to do about records that arrive while a Full rebuild is running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingIncremental {
    /// Patch the candidate with an inactive-instance incremental pass before
    /// it is validated.
    #[default]
    Inline,
    /// Ask the scheduler for an active-instance incremental run once the
    /// candidate has been promoted.
    Enqueue,
    Off,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// How many reference-data preconditions may run at the same time.
    pub precondition_concurrency: usize,
    /// Cadence of the document-count convergence poll (ms).
    pub count_poll_interval_ms: u64,
    /// Upper bound on the document-count convergence wait (secs).
    pub count_timeout_secs: u64,
    pub trailing_incremental: TrailingIncremental,
    /// Maximum duplicate groups fetched per scan while deduplicating.
    pub duplicate_batch_size: usize,
    /// Enqueue an export job after a successful promotion.
    pub export_after_promotion: bool,
}

impl ProcessConfig {
    pub fn count_poll_interval(&self) -> Duration {
        Duration::from_millis(self.count_poll_interval_ms.max(1))
    }

    pub fn count_timeout(&self) -> Duration {
        Duration::from_secs(self.count_timeout_secs)
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            precondition_concurrency: num_cpus::get().clamp(1, 3),
            count_poll_interval_ms: 5_000,
            count_timeout_secs: 10 * 60,
            trailing_incremental: TrailingIncremental::default(),
            duplicate_batch_size: 1_000,
            export_after_promotion: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_public_count: u64,
    pub min_protected_count: u64,
    pub max_disk_usage_percent: f64,
    /// Treat a yellow cluster (missing replicas) as healthy.
    pub allow_yellow_health: bool,
    /// Protected documents sampled for the coordinate leak check.
    pub sensitive_sample_size: usize,
    /// A provider fails the regression guard when its count drops below this
    /// percentage of its count in the last promoted run.
    pub regression_tolerance_percent: u8,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_public_count: 1,
            min_protected_count: 1,
            max_disk_usage_percent: 85.0,
            allow_yellow_health: true,
            sensitive_sample_size: 100,
            regression_tolerance_percent: 80,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Percentage-based jitter to spread out retries.
    pub jitter_ratio: f32,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            jitter_ratio: 0.25,
        }
    }
}

/// Explicit schema applied when an instance is recreated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSchema {
    /// Prefix of the physical index names, e.g. `observation-0`.
    pub name_prefix: String,
    pub shards: u32,
    pub replicas: u32,
    pub max_result_window: u64,
    pub mapping_version: u32,
}

impl IndexSchema {
    pub fn index_name(
        &self,
        instance: harvestry_model::InstanceId,
        partition: harvestry_model::Partition,
    ) -> String {
        match partition {
            harvestry_model::Partition::Public => {
                format!("{}-{}", self.name_prefix, instance)
            }
            harvestry_model::Partition::Protected => {
                format!("{}-protected-{}", self.name_prefix, instance)
            }
        }
    }
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self {
            name_prefix: "observation".into(),
            shards: 6,
            replicas: 0,
            max_result_window: 100_000,
            mapping_version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvestry_model::{InstanceId, Partition};

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "validation": { "min_protected_count": 10 } }"#,
        )
        .expect("parse partial config");

        assert_eq!(config.validation.min_protected_count, 10);
        assert_eq!(config.validation.regression_tolerance_percent, 80);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.process.trailing_incremental, TrailingIncremental::Inline);
    }

    #[test]
    fn index_names_follow_instance_and_partition() {
        let schema = IndexSchema::default();
        assert_eq!(
            schema.index_name(InstanceId::ONE, Partition::Public),
            "observation-1"
        );
        assert_eq!(
            schema.index_name(InstanceId::ZERO, Partition::Protected),
            "observation-protected-0"
        );
    }
}
