//! Ordered steps run after a Full cohort has been processed into the
//! candidate instance.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvestry_model::{
    DocumentId, InstanceId, Partition, RunId, RunMode, RunStatistics,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::database::{CacheCategory, ConfigurationCache, IndexStore, ProviderRegistry};
use crate::error::{PipelineError, Result};

use super::config::{ProcessConfig, RetryConfig, TrailingIncremental};
use super::harvest::{HarvestCoordinator, HarvestResult};
use super::lifecycle::IndexLifecycleManager;
use super::process::{ProcessCoordinator, ProcessResult};
use super::retry::retry_transient;
use super::run_mode::{Admission, RunModeStateMachine, RunPhase};
use super::scheduler::{FollowUpJob, FollowUpScheduler};
use super::validation::ValidationGate;

/// State shared by the post-process steps of one Full run.
#[derive(Debug)]
pub struct PostProcessContext {
    pub run_id: RunId,
    pub candidate: InstanceId,
    pub run_started_at: DateTime<Utc>,
    pub statistics: RunStatistics,
    pub cancel: CancellationToken,
    /// Set once the candidate has become the active instance.
    pub promoted: bool,
}

#[async_trait]
pub trait PostProcessStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut PostProcessContext) -> Result<()>;
}

/// Waits for the store's visible counts to reach the processed totals.
/// Gives up with a warning after `count_timeout`; the count check in
/// validation still applies.
pub struct AwaitDocumentCounts {
    index: Arc<dyn IndexStore>,
    config: ProcessConfig,
}

impl fmt::Debug for AwaitDocumentCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwaitDocumentCounts")
            .field("index", &"IndexStore")
            .field("config", &self.config)
            .finish()
    }
}

impl AwaitDocumentCounts {
    pub fn new(index: Arc<dyn IndexStore>, config: ProcessConfig) -> Self {
        Self { index, config }
    }

    async fn converged(&self, ctx: &PostProcessContext) -> Result<bool> {
        let public = self
            .index
            .count_documents(ctx.candidate, Partition::Public)
            .await?;
        let protected = self
            .index
            .count_documents(ctx.candidate, Partition::Protected)
            .await?;
        debug!(
            public,
            protected,
            expected_public = ctx.statistics.public_count,
            expected_protected = ctx.statistics.protected_count,
            "polled document counts"
        );
        Ok(public >= ctx.statistics.public_count
            && protected >= ctx.statistics.protected_count)
    }
}

#[async_trait]
impl PostProcessStep for AwaitDocumentCounts {
    fn name(&self) -> &'static str {
        "await_document_counts"
    }

    async fn run(&self, ctx: &mut PostProcessContext) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.config.count_timeout();
        let mut ticker = tokio::time::interval(self.config.count_poll_interval());

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return Err(PipelineError::Cancelled("awaiting document counts".into()));
                }
                _ = ticker.tick() => {}
            }
            if self.converged(ctx).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    instance = %ctx.candidate,
                    timeout_secs = self.config.count_timeout_secs,
                    "document counts did not converge before timeout"
                );
                return Ok(());
            }
        }
    }
}

/// Inline IncrementalInactiveInstance pass that patches the candidate with
/// records changed since the Full run started.
pub struct TrailingIncrementalStep {
    state: Arc<RunModeStateMachine>,
    providers: Arc<dyn ProviderRegistry>,
    harvest: HarvestCoordinator,
    process: ProcessCoordinator,
}

impl fmt::Debug for TrailingIncrementalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrailingIncrementalStep")
            .field("harvest", &self.harvest)
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

impl TrailingIncrementalStep {
    pub fn new(
        state: Arc<RunModeStateMachine>,
        providers: Arc<dyn ProviderRegistry>,
        harvest: HarvestCoordinator,
        process: ProcessCoordinator,
    ) -> Self {
        Self {
            state,
            providers,
            harvest,
            process,
        }
    }
}

#[async_trait]
impl PostProcessStep for TrailingIncrementalStep {
    fn name(&self) -> &'static str {
        "trailing_incremental"
    }

    #[instrument(
        name = "post_process.trailing_incremental",
        skip_all,
        fields(candidate = %ctx.candidate)
    )]
    async fn run(&self, ctx: &mut PostProcessContext) -> Result<()> {
        let mode = RunMode::IncrementalInactiveInstance;
        let permit = match self.state.admit(mode, ctx.run_id, &ctx.cancel).await? {
            Admission::Admitted(permit) => permit,
            Admission::Cancelled | Admission::Skipped => {
                return Err(PipelineError::Cancelled(
                    "trailing incremental run not admitted".into(),
                ));
            }
        };

        let providers = self.providers.providers().await?;
        permit.enter(RunPhase::Harvesting);
        match self
            .harvest
            .harvest(&providers, mode, Some(ctx.run_started_at), &ctx.cancel)
            .await?
        {
            HarvestResult::Harvested { total, .. } => {
                debug!(total, "trailing harvest complete");
            }
            HarvestResult::MandatoryFailed { failed, .. } => {
                return Err(PipelineError::stage(
                    mode,
                    "trailing_harvest",
                    format!("mandatory providers failed: {failed:?}"),
                ));
            }
            HarvestResult::Cancelled => {
                return Err(PipelineError::Cancelled("trailing harvest".into()));
            }
        }

        permit.enter(RunPhase::Processing);
        match self.process.process(&providers, mode, &ctx.cancel).await? {
            ProcessResult::Processed { instance, .. } if instance == ctx.candidate => Ok(()),
            ProcessResult::Processed { instance, .. } => Err(PipelineError::Internal(format!(
                "trailing incremental wrote instance {instance} instead of candidate {}",
                ctx.candidate
            ))),
            ProcessResult::MandatoryFailed { failed, .. } => Err(PipelineError::stage(
                mode,
                "trailing_process",
                format!("mandatory providers failed: {failed:?}"),
            )),
            ProcessResult::Cancelled => {
                Err(PipelineError::Cancelled("trailing processing".into()))
            }
        }
    }
}

/// Deletes all but the most recently modified document of every business key
/// in both partitions.
pub struct RemoveDuplicates {
    index: Arc<dyn IndexStore>,
    batch_size: usize,
    retry: RetryConfig,
}

impl fmt::Debug for RemoveDuplicates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveDuplicates")
            .field("batch_size", &self.batch_size)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RemoveDuplicates {
    pub fn new(index: Arc<dyn IndexStore>, batch_size: usize, retry: RetryConfig) -> Self {
        Self {
            index,
            batch_size: batch_size.max(1),
            retry,
        }
    }
}

#[async_trait]
impl PostProcessStep for RemoveDuplicates {
    fn name(&self) -> &'static str {
        "remove_duplicates"
    }

    async fn run(&self, ctx: &mut PostProcessContext) -> Result<()> {
        let instance = ctx.candidate;
        for partition in Partition::ALL {
            let mut removed = 0u64;
            loop {
                if ctx.cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled("removing duplicates".into()));
                }
                let groups = retry_transient(&self.retry, "find_duplicates", || {
                    self.index.find_duplicates(instance, partition, self.batch_size)
                })
                .await?;
                let ids: Vec<DocumentId> = groups
                    .iter()
                    .flat_map(|group| group.superseded())
                    .map(|doc| doc.id.clone())
                    .collect();
                if ids.is_empty() {
                    break;
                }

                let deleted = retry_transient(&self.retry, "delete_documents", || {
                    self.index.delete_documents(instance, partition, &ids)
                })
                .await?;
                removed += deleted;
                if deleted == 0 {
                    warn!(partition = %partition, "duplicate deletion made no progress");
                    break;
                }
            }
            if removed > 0 {
                info!(
                    instance = %instance,
                    partition = %partition,
                    removed,
                    "removed duplicate documents"
                );
            }
        }
        Ok(())
    }
}

/// Runs the validation gate and, on a pass, flips the active instance and
/// fires the follow-up side effects.
pub struct ValidateAndPromote {
    gate: ValidationGate,
    lifecycle: IndexLifecycleManager,
    caches: Arc<dyn ConfigurationCache>,
    followups: Arc<dyn FollowUpScheduler>,
    process: ProcessConfig,
}

impl fmt::Debug for ValidateAndPromote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidateAndPromote")
            .field("gate", &self.gate)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl ValidateAndPromote {
    pub fn new(
        gate: ValidationGate,
        lifecycle: IndexLifecycleManager,
        caches: Arc<dyn ConfigurationCache>,
        followups: Arc<dyn FollowUpScheduler>,
        process: ProcessConfig,
    ) -> Self {
        Self {
            gate,
            lifecycle,
            caches,
            followups,
            process,
        }
    }
}

#[async_trait]
impl PostProcessStep for ValidateAndPromote {
    fn name(&self) -> &'static str {
        "validate_and_promote"
    }

    async fn run(&self, ctx: &mut PostProcessContext) -> Result<()> {
        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled("before validation".into()));
        }

        let report = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(PipelineError::Cancelled("during validation".into()));
            }
            report = self.gate.validate(ctx.candidate) => report,
        };
        // A check may finish in the same poll that observed the cancellation.
        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled("before promotion".into()));
        }
        if !report.passed() {
            return Err(PipelineError::ValidationRejected {
                instance: ctx.candidate,
                reasons: report.failures,
            });
        }

        self.lifecycle.promote(ctx.candidate, &report).await?;
        ctx.promoted = true;

        for category in [
            CacheCategory::ProcessedConfiguration,
            CacheCategory::RunSnapshots,
            CacheCategory::DataProviders,
        ] {
            if let Err(err) = self.caches.clear(category).await {
                warn!(category = %category, error = %err, "failed to clear configuration cache");
            }
        }

        self.followups.request(FollowUpJob::RestartCursorJobs {
            stale_instance: ctx.candidate.other(),
        });
        if self.process.export_after_promotion {
            self.followups.request(FollowUpJob::Export {
                instance: ctx.candidate,
            });
        }
        if self.process.trailing_incremental == TrailingIncremental::Enqueue {
            self.followups.request(FollowUpJob::Run {
                mode: RunMode::IncrementalActiveInstance,
            });
        }
        Ok(())
    }
}
