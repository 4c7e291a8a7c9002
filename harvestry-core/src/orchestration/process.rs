use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, join_all};
use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use harvestry_model::{
    InstanceId, OutcomeStatus, ProcessOutcome, Provider, ProviderId,
    ProviderRunStats, RunMode, RunSnapshot, RunStatistics, TaxonomySnapshot,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::database::{AreaCache, IndexStore, OutcomeStore, TaxonomyCache};
use crate::error::{PipelineError, Result};

use super::config::{IndexSchema, ProcessConfig, RetryConfig};
use super::lifecycle::IndexLifecycleManager;
use super::registry::HandlerRegistry;
use super::retry::retry_transient;

/// Per-provider processing of harvested records into an index instance.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        provider: &Provider,
        taxonomy: &TaxonomySnapshot,
        mode: RunMode,
        instance: InstanceId,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome>;
}

pub fn is_process_eligible(provider: &Provider, mode: RunMode) -> bool {
    provider.is_active && (mode.is_full() || provider.supports_incremental)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    Processed {
        instance: InstanceId,
        statistics: RunStatistics,
    },
    MandatoryFailed {
        instance: InstanceId,
        failed: Vec<ProviderId>,
        outcomes: Vec<ProcessOutcome>,
    },
    Cancelled,
}

/// Prepares reference data and the target instance, then fans processing out
/// over the eligible providers.
#[derive(Clone)]
pub struct ProcessCoordinator {
    handlers: HandlerRegistry,
    taxonomy: Arc<dyn TaxonomyCache>,
    areas: Arc<dyn AreaCache>,
    index: Arc<dyn IndexStore>,
    outcomes: Arc<dyn OutcomeStore>,
    lifecycle: IndexLifecycleManager,
    taxonomy_lock: Arc<Mutex<()>>,
    config: ProcessConfig,
    schema: IndexSchema,
    retry: RetryConfig,
}

impl fmt::Debug for ProcessCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessCoordinator")
            .field("handlers", &self.handlers)
            .field("lifecycle", &self.lifecycle)
            .field("config", &self.config)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Collaborators of a [`ProcessCoordinator`].
#[derive(Clone)]
pub struct ProcessPorts {
    pub taxonomy: Arc<dyn TaxonomyCache>,
    pub areas: Arc<dyn AreaCache>,
    pub index: Arc<dyn IndexStore>,
    pub outcomes: Arc<dyn OutcomeStore>,
}

impl fmt::Debug for ProcessPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessPorts")
            .field("taxonomy", &"TaxonomyCache")
            .field("areas", &"AreaCache")
            .field("index", &"IndexStore")
            .field("outcomes", &"OutcomeStore")
            .finish()
    }
}

impl ProcessCoordinator {
    pub fn new(
        handlers: HandlerRegistry,
        ports: ProcessPorts,
        lifecycle: IndexLifecycleManager,
        taxonomy_lock: Arc<Mutex<()>>,
        config: ProcessConfig,
        schema: IndexSchema,
        retry: RetryConfig,
    ) -> Self {
        Self {
            handlers,
            taxonomy: ports.taxonomy,
            areas: ports.areas,
            index: ports.index,
            outcomes: ports.outcomes,
            lifecycle,
            taxonomy_lock,
            config,
            schema,
            retry,
        }
    }

    pub fn index(&self) -> &Arc<dyn IndexStore> {
        &self.index
    }

    /// Process the eligible providers into the instance `mode` targets.
    #[instrument(
        name = "process.cohort",
        skip(self, providers, cancel),
        fields(mode = %mode, instance = tracing::field::Empty),
        err
    )]
    pub async fn process(
        &self,
        providers: &[Provider],
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult> {
        let started_at = Utc::now();
        let instance = self.lifecycle.target_for(mode).await?;
        tracing::Span::current().record("instance", tracing::field::display(instance));

        match self
            .process_into(providers, mode, instance, started_at, cancel)
            .await
        {
            Ok(result) => Ok(result),
            Err(err) if err.is_cancelled() || cancel.is_cancelled() => {
                info!(error = %err, "processing cancelled");
                Ok(ProcessResult::Cancelled)
            }
            Err(err @ PipelineError::Precondition(_)) => Err(err),
            Err(err) => {
                error!(error = %err, "process stage failed");
                Err(PipelineError::stage(mode, "process", err))
            }
        }
    }

    async fn process_into(
        &self,
        providers: &[Provider],
        mode: RunMode,
        instance: InstanceId,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult> {
        let taxonomy = self.prepare(mode, instance).await?;

        if cancel.is_cancelled() {
            return Ok(ProcessResult::Cancelled);
        }

        let cohort: Vec<Provider> = providers
            .iter()
            .filter(|p| is_process_eligible(p, mode))
            .cloned()
            .collect();

        retry_transient(&self.retry, "disable_refresh", || {
            self.index.set_refresh(instance, false)
        })
        .await?;

        let outcomes = self
            .dispatch(&cohort, &taxonomy, mode, instance, cancel)
            .await;

        let refreshed = retry_transient(&self.retry, "enable_refresh", || {
            self.index.set_refresh(instance, true)
        })
        .await;
        if let Err(err) = &refreshed {
            error!(instance = %instance, error = %err, "failed to re-enable refresh");
        }

        if cancel.is_cancelled() {
            return Ok(ProcessResult::Cancelled);
        }
        refreshed?;

        let failed: Vec<ProviderId> = cohort
            .iter()
            .zip(&outcomes)
            .filter(|(p, o)| p.mandatory_for_success && o.status != OutcomeStatus::Success)
            .map(|(p, _)| p.id)
            .collect();
        if !failed.is_empty() {
            warn!(failed = ?failed, "mandatory provider processing failed");
            return Ok(ProcessResult::MandatoryFailed {
                instance,
                failed,
                outcomes,
            });
        }

        let statistics = self
            .record_snapshot(mode, instance, started_at, outcomes)
            .await?;
        info!(
            public = statistics.public_count,
            protected = statistics.protected_count,
            failed = statistics.failed_count,
            "processing complete"
        );
        Ok(ProcessResult::Processed {
            instance,
            statistics,
        })
    }

    /// Reference data and target instance, bounded by
    /// `precondition_concurrency`.
    async fn prepare(&self, mode: RunMode, instance: InstanceId) -> Result<TaxonomySnapshot> {
        let steps: Vec<BoxFuture<'_, Result<Option<TaxonomySnapshot>>>> = vec![
            self.prepare_taxonomy(mode).map(|r| r.map(Some)).boxed(),
            async {
                self.areas.initialize().await?;
                Ok::<_, PipelineError>(None)
            }
            .boxed(),
            async {
                self.prepare_instance(mode, instance).await?;
                Ok::<_, PipelineError>(None)
            }
            .boxed(),
        ];

        let results: Vec<Option<TaxonomySnapshot>> = stream::iter(steps)
            .buffer_unordered(self.config.precondition_concurrency.max(1))
            .try_collect()
            .await?;

        results
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| PipelineError::Internal("taxonomy step produced no snapshot".into()))
    }

    async fn prepare_taxonomy(&self, mode: RunMode) -> Result<TaxonomySnapshot> {
        let snapshot = if mode.is_full() {
            let _guard = self.taxonomy_lock.lock().await;
            debug!("refreshing taxonomy");
            self.taxonomy.refresh().await?;
            self.taxonomy.clear().await?;
            self.taxonomy.snapshot().await?
        } else {
            self.taxonomy.snapshot().await?
        };

        if snapshot.is_empty() {
            return Err(PipelineError::Precondition(
                "taxonomy snapshot is empty".into(),
            ));
        }
        debug!(taxa = snapshot.len(), "taxonomy ready");
        Ok(snapshot)
    }

    async fn prepare_instance(&self, mode: RunMode, instance: InstanceId) -> Result<()> {
        let exists = retry_transient(&self.retry, "instance_exists", || {
            self.index.instance_exists(instance)
        })
        .await?;

        if mode.is_full() {
            if exists {
                info!(instance = %instance, "clearing instance before rebuild");
                retry_transient(&self.retry, "clear_instance", || {
                    self.index.clear_instance(instance)
                })
                .await?;
            }
            retry_transient(&self.retry, "create_instance", || {
                self.index.create_instance(instance, &self.schema)
            })
            .await?;
            return Ok(());
        }

        if !exists {
            return Err(PipelineError::Precondition(format!(
                "index instance {instance} does not exist"
            )));
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        cohort: &[Provider],
        taxonomy: &TaxonomySnapshot,
        mode: RunMode,
        instance: InstanceId,
        cancel: &CancellationToken,
    ) -> Vec<ProcessOutcome> {
        let tasks = cohort.iter().map(|provider| {
            let provider = provider.clone();
            let handlers = self.handlers.clone();
            let taxonomy = taxonomy.clone();
            let cancel = cancel.clone();
            let span =
                info_span!("process.provider", provider = %provider.id, kind = %provider.kind);
            tokio::spawn(
                async move {
                    process_one(&handlers, &provider, &taxonomy, mode, instance, &cancel).await
                }
                .instrument(span),
            )
        });

        let started_at = Utc::now();
        join_all(tasks)
            .await
            .into_iter()
            .zip(cohort)
            .map(|(joined, provider)| match joined {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(provider = %provider.id, error = %join_err, "process task aborted");
                    ProcessOutcome::failed(
                        provider.id,
                        started_at,
                        format!("process task aborted: {join_err}"),
                    )
                }
            })
            .collect()
    }

    /// Merge harvest and process results into the instance's run snapshot.
    async fn record_snapshot(
        &self,
        mode: RunMode,
        instance: InstanceId,
        started_at: DateTime<Utc>,
        outcomes: Vec<ProcessOutcome>,
    ) -> Result<RunStatistics> {
        let harvests = retry_transient(&self.retry, "harvest_outcomes", || {
            self.outcomes.harvest_outcomes()
        })
        .await?;

        let providers = outcomes
            .into_iter()
            .map(|process| ProviderRunStats {
                provider_id: process.provider_id,
                harvest: harvests
                    .iter()
                    .find(|h| h.provider_id == process.provider_id)
                    .cloned(),
                process: Some(process),
            })
            .collect();
        let statistics = RunStatistics::from_providers(mode, started_at, providers);

        let snapshot = if mode.is_full() {
            RunSnapshot::full(instance, statistics.clone())
        } else {
            let mut snapshot = retry_transient(&self.retry, "run_snapshot", || {
                self.outcomes.run_snapshot(instance)
            })
            .await?
            .unwrap_or_else(|| RunSnapshot::empty(instance));
            snapshot.apply_incremental(statistics.clone());
            snapshot
        };

        retry_transient(&self.retry, "upsert_run_snapshot", || {
            self.outcomes.upsert_run_snapshot(&snapshot)
        })
        .await?;
        Ok(statistics)
    }
}

async fn process_one(
    handlers: &HandlerRegistry,
    provider: &Provider,
    taxonomy: &TaxonomySnapshot,
    mode: RunMode,
    instance: InstanceId,
    cancel: &CancellationToken,
) -> ProcessOutcome {
    let started_at = Utc::now();
    let result = match handlers.processor(provider) {
        Ok(processor) => {
            processor
                .process(provider, taxonomy, mode, instance, cancel)
                .await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => {
            debug!(
                public = outcome.public_count,
                protected = outcome.protected_count,
                status = outcome.status.as_str(),
                "provider processed"
            );
            outcome
        }
        Err(err) => {
            warn!(error = %err, "provider processing failed");
            ProcessOutcome::failed(provider.id, started_at, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvestry_model::ProviderKind;

    #[test]
    fn full_mode_processes_every_active_provider() {
        let plain = Provider::new(1, ProviderKind::Nors, "NORS");
        let incremental = Provider::new(2, ProviderKind::Artportalen, "AP").incremental();
        let inactive = Provider::new(3, ProviderKind::Sers, "SERS").inactive();

        assert!(is_process_eligible(&plain, RunMode::Full));
        assert!(is_process_eligible(&incremental, RunMode::Full));
        assert!(!is_process_eligible(&inactive, RunMode::Full));

        assert!(!is_process_eligible(&plain, RunMode::IncrementalActiveInstance));
        assert!(is_process_eligible(&incremental, RunMode::IncrementalActiveInstance));
    }
}
