use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use harvestry_model::{
    HarvestOutcome, OutcomeStatus, Provider, ProviderId, RunMode,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::database::{OutcomeStore, ProviderRegistry};
use crate::error::{PipelineError, Result};

use super::config::{HarvestConfig, RetryConfig};
use super::registry::HandlerRegistry;
use super::retry::retry_transient;

/// Per-provider harvest logic. Implementations are shared, stateless services
/// and must return promptly once `cancel` fires.
#[async_trait]
pub trait Harvester: Send + Sync {
    async fn harvest_full(
        &self,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome>;

    async fn harvest_incremental(
        &self,
        provider: &Provider,
        mode: RunMode,
        from_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        let _ = (mode, from_date, cancel);
        Err(PipelineError::Provider {
            provider: provider.id,
            message: "incremental harvest not supported".into(),
        })
    }

    async fn harvest_from_archive(
        &self,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        let _ = cancel;
        Err(PipelineError::Provider {
            provider: provider.id,
            message: "archive harvest not supported".into(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarvestStrategy {
    Archive,
    Incremental,
    Full,
}

impl HarvestStrategy {
    pub fn for_provider(provider: &Provider) -> Self {
        if provider.is_archive_backed() {
            HarvestStrategy::Archive
        } else if provider.supports_incremental {
            HarvestStrategy::Incremental
        } else {
            HarvestStrategy::Full
        }
    }
}

/// Whether `provider` joins a harvest cohort of `mode` at `now`.
pub fn is_harvest_eligible(
    provider: &Provider,
    mode: RunMode,
    config: &HarvestConfig,
    now: DateTime<Utc>,
) -> bool {
    if !provider.is_active {
        return false;
    }
    match mode {
        RunMode::Full => {
            provider.include_in_schedule
                && provider
                    .last_successful_harvest
                    .is_none_or(|last| now - last >= config.cool_down())
        }
        RunMode::IncrementalActiveInstance | RunMode::IncrementalInactiveInstance => {
            provider.supports_incremental
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HarvestResult {
    /// Every mandatory provider succeeded. `total` may be zero.
    Harvested {
        total: u64,
        outcomes: Vec<HarvestOutcome>,
    },
    MandatoryFailed {
        failed: Vec<ProviderId>,
        outcomes: Vec<HarvestOutcome>,
    },
    Cancelled,
}

impl HarvestResult {
    pub fn total(&self) -> Option<u64> {
        match self {
            HarvestResult::Harvested { total, .. } => Some(*total),
            _ => None,
        }
    }
}

/// Fans observation harvesting out over the eligible cohort and joins it.
#[derive(Clone)]
pub struct HarvestCoordinator {
    handlers: HandlerRegistry,
    outcomes: Arc<dyn OutcomeStore>,
    providers: Arc<dyn ProviderRegistry>,
    config: HarvestConfig,
    retry: RetryConfig,
}

impl fmt::Debug for HarvestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestCoordinator")
            .field("handlers", &self.handlers)
            .field("outcomes", &"OutcomeStore")
            .field("providers", &"ProviderRegistry")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish()
    }
}

impl HarvestCoordinator {
    pub fn new(
        handlers: HandlerRegistry,
        outcomes: Arc<dyn OutcomeStore>,
        providers: Arc<dyn ProviderRegistry>,
        config: HarvestConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            handlers,
            outcomes,
            providers,
            config,
            retry,
        }
    }

    /// Harvest every eligible provider concurrently.
    ///
    /// Provider failures (including panics) become `Failed` outcomes; only a
    /// failed mandatory provider fails the cohort. Cancellation resolves to
    /// [`HarvestResult::Cancelled`].
    #[instrument(
        name = "harvest.cohort",
        skip(self, providers, cancel),
        fields(mode = %mode, providers = providers.len()),
        err
    )]
    pub async fn harvest(
        &self,
        providers: &[Provider],
        mode: RunMode,
        from_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<HarvestResult> {
        match self.harvest_inner(providers, mode, from_date, cancel).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_cancelled() || cancel.is_cancelled() => {
                info!(error = %err, "harvest cancelled");
                Ok(HarvestResult::Cancelled)
            }
            Err(err) => {
                error!(error = %err, "harvest stage failed");
                Err(PipelineError::stage(mode, "harvest", err))
            }
        }
    }

    async fn harvest_inner(
        &self,
        providers: &[Provider],
        mode: RunMode,
        from_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<HarvestResult> {
        let now = Utc::now();
        let cohort: Vec<Provider> = providers
            .iter()
            .filter(|p| is_harvest_eligible(p, mode, &self.config, now))
            .cloned()
            .collect();

        if cohort.is_empty() {
            info!("no providers eligible for harvest");
            return Ok(HarvestResult::Harvested {
                total: 0,
                outcomes: Vec::new(),
            });
        }

        let tasks = cohort.iter().map(|provider| {
            let provider = provider.clone();
            let handlers = self.handlers.clone();
            let cancel = cancel.clone();
            let span =
                info_span!("harvest.provider", provider = %provider.id, kind = %provider.kind);
            tokio::spawn(
                async move { harvest_one(&handlers, &provider, mode, from_date, &cancel).await }
                    .instrument(span),
            )
        });
        let joined = join_all(tasks).await;

        if cancel.is_cancelled() {
            return Ok(HarvestResult::Cancelled);
        }

        let mut outcomes = Vec::with_capacity(cohort.len());
        for (provider, joined) in cohort.iter().zip(joined) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(provider = %provider.id, error = %join_err, "harvest task aborted");
                    HarvestOutcome::failed(
                        provider.id,
                        now,
                        format!("harvest task aborted: {join_err}"),
                    )
                }
            };
            self.record(provider, &outcome).await?;
            outcomes.push(outcome);
        }

        let failed: Vec<ProviderId> = cohort
            .iter()
            .zip(&outcomes)
            .filter(|(p, o)| p.mandatory_for_success && o.status != OutcomeStatus::Success)
            .map(|(p, _)| p.id)
            .collect();

        if !failed.is_empty() {
            warn!(failed = ?failed, "mandatory provider harvest failed");
            return Ok(HarvestResult::MandatoryFailed { failed, outcomes });
        }

        let total = outcomes.iter().map(HarvestOutcome::effective_count).sum();
        info!(total, providers = outcomes.len(), "harvest complete");
        Ok(HarvestResult::Harvested { total, outcomes })
    }

    async fn record(&self, provider: &Provider, outcome: &HarvestOutcome) -> Result<()> {
        if outcome.should_persist() {
            retry_transient(&self.retry, "upsert_harvest_outcome", || {
                self.outcomes.upsert_harvest_outcome(outcome)
            })
            .await?;
        } else {
            debug!(
                provider = %provider.id,
                status = outcome.status.as_str(),
                count = outcome.count,
                "outcome not persisted"
            );
        }

        if provider.is_archive_backed()
            && outcome.status == OutcomeStatus::Success
            && let Some(metadata) = &outcome.dynamic_metadata
        {
            retry_transient(&self.retry, "patch_dynamic_metadata", || {
                self.providers
                    .patch_dynamic_metadata(provider.id, metadata.clone())
            })
            .await?;
        }
        Ok(())
    }
}

async fn harvest_one(
    handlers: &HandlerRegistry,
    provider: &Provider,
    mode: RunMode,
    from_date: Option<DateTime<Utc>>,
    cancel: &CancellationToken,
) -> HarvestOutcome {
    let started_at = Utc::now();
    let result = match handlers.harvester(provider) {
        Ok(harvester) => match HarvestStrategy::for_provider(provider) {
            HarvestStrategy::Archive => harvester.harvest_from_archive(provider, cancel).await,
            HarvestStrategy::Incremental => {
                harvester
                    .harvest_incremental(provider, mode, from_date, cancel)
                    .await
            }
            HarvestStrategy::Full => harvester.harvest_full(provider, cancel).await,
        },
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => {
            debug!(count = outcome.count, status = outcome.status.as_str(), "provider harvested");
            outcome
        }
        Err(err) if err.is_cancelled() => HarvestOutcome::cancelled(provider.id, started_at),
        Err(err) => {
            warn!(error = %err, "provider harvest failed");
            HarvestOutcome::failed(provider.id, started_at, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use harvestry_model::ProviderKind;

    #[test]
    fn full_mode_respects_schedule_and_cool_down() {
        let config = HarvestConfig {
            cool_down_secs: 3600,
        };
        let now = Utc::now();

        let fresh = Provider::new(1, ProviderKind::Artportalen, "Artportalen");
        assert!(is_harvest_eligible(&fresh, RunMode::Full, &config, now));

        let mut recent = fresh.clone();
        recent.last_successful_harvest = Some(now - Duration::minutes(10));
        assert!(!is_harvest_eligible(&recent, RunMode::Full, &config, now));

        let mut stale = fresh.clone();
        stale.last_successful_harvest = Some(now - Duration::hours(2));
        assert!(is_harvest_eligible(&stale, RunMode::Full, &config, now));

        let mut unscheduled = fresh.clone();
        unscheduled.include_in_schedule = false;
        assert!(!is_harvest_eligible(&unscheduled, RunMode::Full, &config, now));

        assert!(!is_harvest_eligible(&fresh.clone().inactive(), RunMode::Full, &config, now));
    }

    #[test]
    fn incremental_modes_require_incremental_support() {
        let config = HarvestConfig::default();
        let now = Utc::now();
        let plain = Provider::new(2, ProviderKind::Kul, "KUL");
        let incremental = plain.clone().incremental();

        for mode in [
            RunMode::IncrementalActiveInstance,
            RunMode::IncrementalInactiveInstance,
        ] {
            assert!(!is_harvest_eligible(&plain, mode, &config, now));
            assert!(is_harvest_eligible(&incremental, mode, &config, now));
        }
    }

    #[test]
    fn archive_source_takes_precedence() {
        let provider = Provider::new(3, ProviderKind::DarwinCoreArchive, "DwC-A")
            .incremental()
            .with_archive("https://example.org/dwca.zip");
        assert_eq!(HarvestStrategy::for_provider(&provider), HarvestStrategy::Archive);

        let provider = Provider::new(4, ProviderKind::Artportalen, "AP").incremental();
        assert_eq!(
            HarvestStrategy::for_provider(&provider),
            HarvestStrategy::Incremental
        );

        let provider = Provider::new(5, ProviderKind::Shark, "SHARK");
        assert_eq!(HarvestStrategy::for_provider(&provider), HarvestStrategy::Full);
    }
}
