//! Side channel to the external job scheduler that invokes the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use harvestry_model::{InstanceId, RunId, RunMode};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use crate::error::Result;

/// Scheduler-side job types the orchestrator asks about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "stage", content = "mode", rename_all = "snake_case")]
pub enum ScheduledJobKind {
    Harvest(RunMode),
    Process(RunMode),
}

/// Read access to the scheduler's inventory of running jobs.
#[async_trait]
pub trait JobInventory: Send + Sync {
    /// Whether a job of `kind` other than `exclude` is currently running.
    async fn is_in_progress(
        &self,
        kind: ScheduledJobKind,
        exclude: RunId,
    ) -> Result<bool>;
}

/// Work the orchestrator asks the scheduler to start after a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum FollowUpJob {
    Run { mode: RunMode },
    Export { instance: InstanceId },
    /// Restart consumers paging through the instance that just went stale.
    RestartCursorJobs { stale_instance: InstanceId },
}

/// Fire-and-forget enqueue; the orchestrator never waits on the result.
pub trait FollowUpScheduler: Send + Sync {
    fn request(&self, job: FollowUpJob);
}

/// Follow-up scheduler backed by an unbounded channel drained by whatever
/// owns the real job queue.
#[derive(Clone, Debug)]
pub struct ChannelFollowUpScheduler {
    tx: mpsc::UnboundedSender<FollowUpJob>,
}

impl ChannelFollowUpScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FollowUpJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FollowUpScheduler for ChannelFollowUpScheduler {
    fn request(&self, job: FollowUpJob) {
        if let Err(err) = self.tx.send(job) {
            warn!(job = ?err.0, "follow-up receiver dropped; request discarded");
        }
    }
}

/// Inventory kept in process, for single-node deployments and tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryJobInventory {
    running: Arc<Mutex<Vec<(ScheduledJobKind, RunId)>>>,
}

impl InMemoryJobInventory {
    pub async fn started(&self, kind: ScheduledJobKind, run_id: RunId) {
        self.running.lock().await.push((kind, run_id));
    }

    pub async fn finished(&self, run_id: RunId) {
        self.running.lock().await.retain(|(_, id)| *id != run_id);
    }
}

#[async_trait]
impl JobInventory for InMemoryJobInventory {
    async fn is_in_progress(
        &self,
        kind: ScheduledJobKind,
        exclude: RunId,
    ) -> Result<bool> {
        let guard = self.running.lock().await;
        Ok(guard.iter().any(|(k, id)| *k == kind && *id != exclude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inventory_ignores_the_asking_run() {
        let inventory = InMemoryJobInventory::default();
        let me = RunId::new();
        let kind = ScheduledJobKind::Process(RunMode::Full);

        inventory.started(kind, me).await;
        assert!(!inventory.is_in_progress(kind, me).await.unwrap());

        let other = RunId::new();
        inventory.started(kind, other).await;
        assert!(inventory.is_in_progress(kind, me).await.unwrap());

        inventory.finished(other).await;
        assert!(!inventory.is_in_progress(kind, me).await.unwrap());
    }

    #[test]
    fn channel_scheduler_delivers_requests() {
        let (scheduler, mut rx) = ChannelFollowUpScheduler::new();
        scheduler.request(FollowUpJob::Export {
            instance: InstanceId::ONE,
        });

        assert_eq!(
            rx.try_recv().ok(),
            Some(FollowUpJob::Export {
                instance: InstanceId::ONE
            })
        );
    }
}
