use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use harvestry_model::{HarvestOutcome, InstanceId, ProviderId, RunSnapshot};
use tokio::sync::Mutex;

use crate::database::ports::OutcomeStore;
use crate::error::Result;

#[derive(Clone, Debug, Default)]
pub struct InMemoryOutcomeStore {
    harvests: Arc<Mutex<HashMap<ProviderId, HarvestOutcome>>>,
    snapshots: Arc<Mutex<HashMap<InstanceId, RunSnapshot>>>,
}

impl InMemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn harvest_outcome(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<HarvestOutcome>> {
        let guard = self.harvests.lock().await;
        Ok(guard.get(&provider_id).cloned())
    }

    async fn harvest_outcomes(&self) -> Result<Vec<HarvestOutcome>> {
        let guard = self.harvests.lock().await;
        let mut outcomes: Vec<_> = guard.values().cloned().collect();
        outcomes.sort_by_key(|o| o.provider_id);
        Ok(outcomes)
    }

    async fn upsert_harvest_outcome(&self, outcome: &HarvestOutcome) -> Result<()> {
        let mut guard = self.harvests.lock().await;
        guard.insert(outcome.provider_id, outcome.clone());
        Ok(())
    }

    async fn run_snapshot(&self, instance: InstanceId) -> Result<Option<RunSnapshot>> {
        let guard = self.snapshots.lock().await;
        Ok(guard.get(&instance).cloned())
    }

    async fn upsert_run_snapshot(&self, snapshot: &RunSnapshot) -> Result<()> {
        let mut guard = self.snapshots.lock().await;
        guard.insert(snapshot.instance, snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn latest_harvest_outcome_replaces_prior() {
        let store = InMemoryOutcomeStore::new();
        let started = Utc::now();
        store
            .upsert_harvest_outcome(&HarvestOutcome::success(ProviderId(1), 10, started))
            .await
            .unwrap();
        store
            .upsert_harvest_outcome(&HarvestOutcome::failed(ProviderId(1), started, "timeout"))
            .await
            .unwrap();

        let stored = store.harvest_outcome(ProviderId(1)).await.unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("timeout"));
        assert_eq!(store.harvest_outcomes().await.unwrap().len(), 1);
    }
}
