//! One harvest → process → validate → promote run, composed from injected
//! stages.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvestry_model::{RunId, RunMode, RunOutcome};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::database::{
    ActiveInstanceStore, AreaCache, ConfigurationCache, IndexStore, OutcomeStore,
    ProviderRegistry, TaxonomyCache,
};
use crate::error::{PipelineError, Result};

use super::config::{PipelineConfig, TrailingIncremental};
use super::harvest::{HarvestCoordinator, HarvestResult};
use super::lifecycle::IndexLifecycleManager;
use super::post_process::{
    AwaitDocumentCounts, PostProcessContext, PostProcessStep, RemoveDuplicates,
    TrailingIncrementalStep, ValidateAndPromote,
};
use super::process::{ProcessCoordinator, ProcessPorts, ProcessResult};
use super::registry::HandlerRegistry;
use super::run_mode::{Admission, RunLocks, RunModeStateMachine, RunPhase};
use super::scheduler::{FollowUpScheduler, JobInventory};
use super::validation::ValidationGate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub mode: RunMode,
    /// Lower bound for incremental harvests. `None` lets each harvester pick
    /// its own checkpoint.
    pub from_date: Option<DateTime<Utc>>,
}

impl RunRequest {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            from_date: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: RunId,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

/// Work that must complete before observation harvesting starts. A failing
/// step fails the run.
#[async_trait]
pub trait PreHarvestStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &RunContext) -> Result<()>;
}

/// Drops cached provider rows so the cohort is read fresh.
pub struct RefreshProviderCache {
    providers: Arc<dyn ProviderRegistry>,
}

impl fmt::Debug for RefreshProviderCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshProviderCache").finish_non_exhaustive()
    }
}

impl RefreshProviderCache {
    pub fn new(providers: Arc<dyn ProviderRegistry>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl PreHarvestStep for RefreshProviderCache {
    fn name(&self) -> &'static str {
        "refresh_provider_cache"
    }

    async fn run(&self, _ctx: &RunContext) -> Result<()> {
        self.providers.clear().await
    }
}

/// Every storage and reference-data boundary a pipeline talks to.
#[derive(Clone)]
pub struct PipelinePorts {
    pub providers: Arc<dyn ProviderRegistry>,
    pub outcomes: Arc<dyn OutcomeStore>,
    pub index: Arc<dyn IndexStore>,
    pub active_instance: Arc<dyn ActiveInstanceStore>,
    pub taxonomy: Arc<dyn TaxonomyCache>,
    pub areas: Arc<dyn AreaCache>,
    pub configuration: Arc<dyn ConfigurationCache>,
    pub inventory: Arc<dyn JobInventory>,
    pub followups: Arc<dyn FollowUpScheduler>,
}

impl fmt::Debug for PipelinePorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelinePorts").finish_non_exhaustive()
    }
}

/// Orchestrator-owned locks, shared by every pipeline built from them.
#[derive(Clone, Debug, Default)]
pub struct PipelineLocks {
    pub runs: RunLocks,
    pub taxonomy: Arc<Mutex<()>>,
}

pub struct RunPipeline {
    providers: Arc<dyn ProviderRegistry>,
    state: Arc<RunModeStateMachine>,
    lifecycle: IndexLifecycleManager,
    harvest: HarvestCoordinator,
    process: ProcessCoordinator,
    pre_harvest: Vec<Arc<dyn PreHarvestStep>>,
    post_process: Vec<Arc<dyn PostProcessStep>>,
}

impl fmt::Debug for RunPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunPipeline")
            .field("state", &self.state)
            .field("harvest", &self.harvest)
            .field("process", &self.process)
            .field(
                "pre_harvest",
                &self.pre_harvest.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field(
                "post_process",
                &self.post_process.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RunPipeline {
    pub fn builder(
        providers: Arc<dyn ProviderRegistry>,
        state: Arc<RunModeStateMachine>,
        lifecycle: IndexLifecycleManager,
        harvest: HarvestCoordinator,
        process: ProcessCoordinator,
    ) -> RunPipelineBuilder {
        RunPipelineBuilder {
            inner: RunPipeline {
                providers,
                state,
                lifecycle,
                harvest,
                process,
                pre_harvest: Vec::new(),
                post_process: Vec::new(),
            },
        }
    }

    /// Wire the standard stages from `ports` and `config`.
    ///
    /// Post-processing runs, in order: count convergence, the inline trailing
    /// incremental pass (when configured), duplicate removal, then validation
    /// and promotion.
    pub fn assemble(
        ports: PipelinePorts,
        handlers: HandlerRegistry,
        config: &PipelineConfig,
        locks: PipelineLocks,
    ) -> RunPipelineBuilder {
        let state = Arc::new(RunModeStateMachine::new(
            locks.runs,
            Arc::clone(&ports.inventory),
        ));
        let lifecycle =
            IndexLifecycleManager::new(Arc::clone(&ports.active_instance), config.retry);
        let harvest = HarvestCoordinator::new(
            handlers.clone(),
            Arc::clone(&ports.outcomes),
            Arc::clone(&ports.providers),
            config.harvest.clone(),
            config.retry,
        );
        let process = ProcessCoordinator::new(
            handlers,
            ProcessPorts {
                taxonomy: Arc::clone(&ports.taxonomy),
                areas: Arc::clone(&ports.areas),
                index: Arc::clone(&ports.index),
                outcomes: Arc::clone(&ports.outcomes),
            },
            lifecycle.clone(),
            locks.taxonomy,
            config.process.clone(),
            config.index.clone(),
            config.retry,
        );

        let mut post_process: Vec<Arc<dyn PostProcessStep>> = vec![Arc::new(
            AwaitDocumentCounts::new(Arc::clone(&ports.index), config.process.clone()),
        )];
        if config.process.trailing_incremental == TrailingIncremental::Inline {
            post_process.push(Arc::new(TrailingIncrementalStep::new(
                Arc::clone(&state),
                Arc::clone(&ports.providers),
                harvest.clone(),
                process.clone(),
            )));
        }
        post_process.push(Arc::new(RemoveDuplicates::new(
            Arc::clone(&ports.index),
            config.process.duplicate_batch_size,
            config.retry,
        )));
        post_process.push(Arc::new(ValidateAndPromote::new(
            ValidationGate::standard(
                Arc::clone(&ports.index),
                Arc::clone(&ports.outcomes),
                &config.validation,
            ),
            lifecycle.clone(),
            Arc::clone(&ports.configuration),
            Arc::clone(&ports.followups),
            config.process.clone(),
        )));

        let mut builder = RunPipeline::builder(
            Arc::clone(&ports.providers),
            state,
            lifecycle,
            harvest,
            process,
        )
        .pre_harvest(Arc::new(RefreshProviderCache::new(Arc::clone(
            &ports.providers,
        ))));
        for step in post_process {
            builder = builder.post_process(step);
        }
        builder
    }

    pub fn state(&self) -> &Arc<RunModeStateMachine> {
        &self.state
    }

    pub fn lifecycle(&self) -> &IndexLifecycleManager {
        &self.lifecycle
    }

    /// Execute one run to a terminal outcome. Never returns an error: every
    /// failure is folded into [`RunOutcome::Failed`].
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> RunOutcome {
        let run_id = RunId::new();
        let span = info_span!("run", run_id = %run_id, mode = %request.mode);
        async move {
            let outcome = match self.execute(run_id, request, &cancel).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_cancelled() || cancel.is_cancelled() => {
                    info!(error = %err, "run cancelled");
                    RunOutcome::Cancelled
                }
                Err(err) => {
                    error!(error = %err, "run failed");
                    RunOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            info!(outcome = ?outcome, "run finished");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        run_id: RunId,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let mode = request.mode;
        let permit = match self.state.admit(mode, run_id, cancel).await? {
            Admission::Admitted(permit) => permit,
            Admission::Skipped => return Ok(RunOutcome::Skipped),
            Admission::Cancelled => return Ok(RunOutcome::Cancelled),
        };
        let ctx = RunContext {
            run_id,
            mode,
            started_at: Utc::now(),
            cancel: cancel.clone(),
        };

        permit.enter(RunPhase::Harvesting);
        for step in &self.pre_harvest {
            step.run(&ctx).await.map_err(|err| {
                PipelineError::stage(mode, "pre_harvest", format!("{}: {err}", step.name()))
            })?;
        }
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let providers = self.providers.providers().await?;
        let harvested = match self
            .harvest
            .harvest(&providers, mode, request.from_date, cancel)
            .await?
        {
            HarvestResult::Harvested { total, .. } => total,
            HarvestResult::MandatoryFailed { failed, .. } => {
                return Ok(RunOutcome::Failed {
                    reason: format!("mandatory providers failed to harvest: {failed:?}"),
                });
            }
            HarvestResult::Cancelled => return Ok(RunOutcome::Cancelled),
        };

        if mode.is_full() && harvested == 0 {
            info!("full harvest produced no records; skipping processing");
            return Ok(RunOutcome::Success {
                harvested,
                promoted: false,
            });
        }

        permit.enter(RunPhase::Processing);
        let (candidate, statistics) = match self.process.process(&providers, mode, cancel).await? {
            ProcessResult::Processed {
                instance,
                statistics,
            } => (instance, statistics),
            ProcessResult::MandatoryFailed { failed, .. } => {
                return Ok(RunOutcome::Failed {
                    reason: format!("mandatory providers failed to process: {failed:?}"),
                });
            }
            ProcessResult::Cancelled => return Ok(RunOutcome::Cancelled),
        };

        if mode.is_incremental() {
            return Ok(RunOutcome::Success {
                harvested,
                promoted: false,
            });
        }

        let mut post = PostProcessContext {
            run_id,
            candidate,
            run_started_at: ctx.started_at,
            statistics,
            cancel: cancel.clone(),
            promoted: false,
        };
        for step in &self.post_process {
            if let Err(err) = step.run(&mut post).await {
                if post.promoted {
                    warn!(step = step.name(), error = %err, "post-promotion step failed");
                    break;
                }
                if err.is_cancelled() {
                    return Err(err);
                }
                return Err(match err {
                    err @ PipelineError::ValidationRejected { .. } => err,
                    err => PipelineError::stage(mode, step.name(), err),
                });
            }
        }

        Ok(RunOutcome::Success {
            harvested,
            promoted: post.promoted,
        })
    }
}

pub struct RunPipelineBuilder {
    inner: RunPipeline,
}

impl fmt::Debug for RunPipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunPipelineBuilder")
            .field("inner", &self.inner)
            .finish()
    }
}

impl RunPipelineBuilder {
    pub fn pre_harvest(mut self, step: Arc<dyn PreHarvestStep>) -> Self {
        self.inner.pre_harvest.push(step);
        self
    }

    pub fn post_process(mut self, step: Arc<dyn PostProcessStep>) -> Self {
        self.inner.post_process.push(step);
        self
    }

    pub fn build(self) -> RunPipeline {
        self.inner
    }
}
