use chrono::{DateTime, Utc};

use crate::ids::ProviderId;
use crate::instance::InstanceId;
use crate::outcome::{HarvestOutcome, OutcomeStatus, ProcessOutcome};
use crate::run_mode::RunMode;

/// Merged harvest and process statistics for one provider in one run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProviderRunStats {
    pub provider_id: ProviderId,
    pub harvest: Option<HarvestOutcome>,
    pub process: Option<ProcessOutcome>,
}

impl ProviderRunStats {
    pub fn public_count(&self) -> u64 {
        self.process.as_ref().map_or(0, |p| p.public_count)
    }

    pub fn protected_count(&self) -> u64 {
        self.process.as_ref().map_or(0, |p| p.protected_count)
    }

    pub fn processed_successfully(&self) -> bool {
        self.process
            .as_ref()
            .is_some_and(|p| p.status == OutcomeStatus::Success)
    }
}

/// Aggregate counts of a single run over its whole cohort.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunStatistics {
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub public_count: u64,
    pub protected_count: u64,
    pub failed_count: u64,
    pub providers: Vec<ProviderRunStats>,
}

impl RunStatistics {
    pub fn from_providers(
        mode: RunMode,
        started_at: DateTime<Utc>,
        providers: Vec<ProviderRunStats>,
    ) -> Self {
        let (public_count, protected_count, failed_count) = providers
            .iter()
            .filter_map(|stats| stats.process.as_ref())
            .fold((0, 0, 0), |(public, protected, failed), p| {
                (
                    public + p.public_count,
                    protected + p.protected_count,
                    failed + p.failed_count,
                )
            });

        Self {
            mode,
            started_at,
            ended_at: Utc::now(),
            public_count,
            protected_count,
            failed_count,
            providers,
        }
    }

    pub fn provider(&self, provider_id: ProviderId) -> Option<&ProviderRunStats> {
        self.providers.iter().find(|p| p.provider_id == provider_id)
    }
}

/// Publish-cycle record for one index instance.
///
/// A Full run replaces the whole snapshot; incremental runs only touch
/// [`RunSnapshot::latest_incremental`] so the Full baseline survives.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunSnapshot {
    pub instance: InstanceId,
    pub baseline: Option<RunStatistics>,
    pub latest_incremental: Option<RunStatistics>,
    pub updated_at: DateTime<Utc>,
}

impl RunSnapshot {
    pub fn empty(instance: InstanceId) -> Self {
        Self {
            instance,
            baseline: None,
            latest_incremental: None,
            updated_at: Utc::now(),
        }
    }

    pub fn full(instance: InstanceId, statistics: RunStatistics) -> Self {
        Self {
            instance,
            baseline: Some(statistics),
            latest_incremental: None,
            updated_at: Utc::now(),
        }
    }

    pub fn apply_incremental(&mut self, statistics: RunStatistics) {
        debug_assert!(statistics.mode.is_incremental());
        self.latest_incremental = Some(statistics);
        self.updated_at = Utc::now();
    }
}
