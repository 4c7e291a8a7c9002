use chrono::{DateTime, Utc};

use crate::ids::ProviderId;
use crate::provider::DatasetMetadata;

/// Terminal status of a single provider's harvest or process call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OutcomeStatus {
    Success,
    Failed,
    /// The provider stopped cooperatively; the result is kept out of storage.
    CancelledSuccess,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::CancelledSuccess => "cancelled_success",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(OutcomeStatus::Success),
            "failed" => Some(OutcomeStatus::Failed),
            "cancelled_success" => Some(OutcomeStatus::CancelledSuccess),
            _ => None,
        }
    }
}

/// Result of harvesting one provider during one run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HarvestOutcome {
    pub provider_id: ProviderId,
    pub status: OutcomeStatus,
    /// Number of harvested records, or [`HarvestOutcome::EXTERNALLY_HARVESTED`].
    pub count: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub notes: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dynamic_metadata: Option<DatasetMetadata>,
}

impl HarvestOutcome {
    /// Count sentinel: the provider is harvested manually or by another system,
    /// so the stored outcome must be left alone.
    pub const EXTERNALLY_HARVESTED: i64 = -1;

    pub fn success(
        provider_id: ProviderId,
        count: i64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider_id,
            status: OutcomeStatus::Success,
            count,
            started_at,
            ended_at: Utc::now(),
            notes: None,
            dynamic_metadata: None,
        }
    }

    pub fn failed(
        provider_id: ProviderId,
        started_at: DateTime<Utc>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            provider_id,
            status: OutcomeStatus::Failed,
            count: 0,
            started_at,
            ended_at: Utc::now(),
            notes: Some(notes.into()),
            dynamic_metadata: None,
        }
    }

    pub fn cancelled(provider_id: ProviderId, started_at: DateTime<Utc>) -> Self {
        Self {
            provider_id,
            status: OutcomeStatus::CancelledSuccess,
            count: 0,
            started_at,
            ended_at: Utc::now(),
            notes: Some("harvest cancelled".into()),
            dynamic_metadata: None,
        }
    }

    pub fn is_externally_harvested(&self) -> bool {
        self.count == Self::EXTERNALLY_HARVESTED
    }

    /// Whether the outcome should replace the stored record for the provider.
    pub fn should_persist(&self) -> bool {
        self.status != OutcomeStatus::CancelledSuccess
            && !self.is_externally_harvested()
    }

    /// Contribution to the cohort total; the sentinel counts as zero.
    pub fn effective_count(&self) -> u64 {
        self.count.max(0) as u64
    }
}

/// Result of processing one provider into an index instance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessOutcome {
    pub provider_id: ProviderId,
    pub status: OutcomeStatus,
    pub public_count: u64,
    pub protected_count: u64,
    pub failed_count: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub notes: Option<String>,
}

impl ProcessOutcome {
    pub fn success(
        provider_id: ProviderId,
        public_count: u64,
        protected_count: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider_id,
            status: OutcomeStatus::Success,
            public_count,
            protected_count,
            failed_count: 0,
            started_at,
            ended_at: Utc::now(),
            notes: None,
        }
    }

    pub fn failed(
        provider_id: ProviderId,
        started_at: DateTime<Utc>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            provider_id,
            status: OutcomeStatus::Failed,
            public_count: 0,
            protected_count: 0,
            failed_count: 0,
            started_at,
            ended_at: Utc::now(),
            notes: Some(notes.into()),
        }
    }

    pub fn total_count(&self) -> u64 {
        self.public_count + self.protected_count
    }
}
