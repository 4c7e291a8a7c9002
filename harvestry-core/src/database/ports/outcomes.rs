use async_trait::async_trait;
use harvestry_model::{HarvestOutcome, InstanceId, ProviderId, RunSnapshot};

use crate::error::Result;

/// Durable record of the latest harvest per provider and the run snapshot per
/// index instance. Upserts replace; no history is kept.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn harvest_outcome(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<HarvestOutcome>>;

    async fn harvest_outcomes(&self) -> Result<Vec<HarvestOutcome>>;

    async fn upsert_harvest_outcome(&self, outcome: &HarvestOutcome) -> Result<()>;

    async fn run_snapshot(&self, instance: InstanceId) -> Result<Option<RunSnapshot>>;

    async fn upsert_run_snapshot(&self, snapshot: &RunSnapshot) -> Result<()>;
}
