//! Synthetic providers and an all-in-memory environment for running a publish
//! cycle locally.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvestry_model::{
    Coordinates, DatasetMetadata, DocumentId, HarvestOutcome, IndexedDocument, InstanceId,
    Partition, ProcessOutcome, Provider, ProviderKind, RunMode, Taxon, TaxonId,
    TaxonomySnapshot,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::database::in_memory::{
    InMemoryActiveInstanceStore, InMemoryAreaCache, InMemoryConfigurationCache,
    InMemoryIndexStore, InMemoryOutcomeStore, InMemoryProviderRegistry,
    InMemoryTaxonomyCache,
};
use crate::error::{PipelineError, Result};
use crate::orchestration::{
    ChannelFollowUpScheduler, FollowUpJob, HandlerRegistry, Harvester,
    InMemoryJobInventory, PipelineConfig, PipelineLocks, PipelinePorts, Processor,
    RunPipeline,
};

const SIMULATED_LATENCY: Duration = Duration::from_millis(15);

/// Records a demo provider yields on a Full harvest.
fn full_volume(provider: &Provider) -> u64 {
    40 + u64::from(provider.id.as_i32().unsigned_abs()) * 15
}

async fn simulate_io(cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled("demo provider".into())),
        _ = tokio::time::sleep(SIMULATED_LATENCY) => Ok(()),
    }
}

#[derive(Debug, Default)]
pub struct DemoHarvester;

#[async_trait]
impl Harvester for DemoHarvester {
    async fn harvest_full(
        &self,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        let started_at = Utc::now();
        simulate_io(cancel).await?;
        Ok(HarvestOutcome::success(
            provider.id,
            full_volume(provider) as i64,
            started_at,
        ))
    }

    async fn harvest_incremental(
        &self,
        provider: &Provider,
        mode: RunMode,
        from_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        if mode.is_full() {
            return self.harvest_full(provider, cancel).await;
        }
        let started_at = Utc::now();
        simulate_io(cancel).await?;
        let changed = from_date.map_or(3, |_| 1);
        Ok(HarvestOutcome::success(provider.id, changed, started_at))
    }

    async fn harvest_from_archive(
        &self,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        let mut outcome = self.harvest_full(provider, cancel).await?;
        outcome.dynamic_metadata = Some(DatasetMetadata {
            title: Some(format!("{} occurrence archive", provider.name)),
            description: Some("Synthetic Darwin Core archive".into()),
            citation: None,
            modified: Some(Utc::now()),
        });
        Ok(outcome)
    }
}

/// Writes synthetic documents straight into an [`InMemoryIndexStore`].
///
/// Every fifth record is protected; its public copy carries coordinates
/// diffused to one decimal. Archive-backed providers also leave one stale
/// duplicate behind on Full runs.
#[derive(Debug)]
pub struct DemoProcessor {
    index: InMemoryIndexStore,
    sequence: AtomicU64,
}

impl DemoProcessor {
    pub fn new(index: InMemoryIndexStore) -> Self {
        Self {
            index,
            sequence: AtomicU64::new(0),
        }
    }

    fn document(
        key: &str,
        suffix: &str,
        location: Coordinates,
        protected: bool,
        modified: DateTime<Utc>,
    ) -> IndexedDocument {
        IndexedDocument {
            id: DocumentId(format!("{key}#{suffix}")),
            business_key: key.to_string(),
            location: Some(location),
            modified,
            protected,
        }
    }
}

fn diffuse(location: Coordinates) -> Coordinates {
    Coordinates {
        latitude: (location.latitude * 10.0).round() / 10.0,
        longitude: (location.longitude * 10.0).round() / 10.0,
    }
}

#[async_trait]
impl Processor for DemoProcessor {
    async fn process(
        &self,
        provider: &Provider,
        taxonomy: &TaxonomySnapshot,
        mode: RunMode,
        instance: InstanceId,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome> {
        let started_at = Utc::now();
        simulate_io(cancel).await?;

        let volume = if mode.is_full() {
            full_volume(provider)
        } else if provider.supports_incremental {
            2
        } else {
            0
        };
        let sensitive = taxonomy.iter().any(|t| t.protection_level > 2);

        let (mut public, mut protected) = (0u64, 0u64);
        let mut first_key = None;
        for i in 0..volume {
            let n = self.sequence.fetch_add(1, Ordering::Relaxed);
            let key = format!("urn:harvestry:demo:{}:{n}", provider.id);
            let exact = Coordinates {
                latitude: 55.0 + (n % 1_300) as f64 * 0.01 + 0.0137,
                longitude: 11.0 + (n % 1_200) as f64 * 0.01 + 0.0071,
            };
            let now = Utc::now();

            if sensitive && i % 5 == 0 {
                self.index
                    .insert(
                        instance,
                        Partition::Protected,
                        Self::document(&key, "protected", exact, true, now),
                    )
                    .await;
                self.index
                    .insert(
                        instance,
                        Partition::Public,
                        Self::document(&key, "public", diffuse(exact), false, now),
                    )
                    .await;
                protected += 1;
            } else {
                self.index
                    .insert(
                        instance,
                        Partition::Public,
                        Self::document(&key, "public", exact, false, now),
                    )
                    .await;
            }
            public += 1;
            first_key.get_or_insert(key);

            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled("demo processing".into()));
            }
        }

        if mode.is_full()
            && provider.is_archive_backed()
            && let Some(key) = first_key
        {
            let stale = Utc::now() - chrono::Duration::days(30);
            let location = Coordinates {
                latitude: 59.0,
                longitude: 18.0,
            };
            self.index
                .insert(
                    instance,
                    Partition::Public,
                    Self::document(&key, "stale", location, false, stale),
                )
                .await;
        }

        Ok(ProcessOutcome::success(provider.id, public, protected, started_at))
    }
}

pub fn demo_providers() -> Vec<Provider> {
    vec![
        Provider::new(1, ProviderKind::Artportalen, "Species Observation System")
            .mandatory()
            .incremental(),
        Provider::new(2, ProviderKind::DarwinCoreArchive, "Herbarium archive")
            .with_archive("https://example.org/dwca/herbarium.zip"),
        Provider::new(3, ProviderKind::Kul, "Coastal fish monitoring"),
        Provider::new(4, ProviderKind::Shark, "Marine plankton").incremental(),
        Provider::new(5, ProviderKind::Nors, "Lake fish survey").inactive(),
    ]
}

pub fn demo_taxa() -> Vec<Taxon> {
    vec![
        Taxon {
            id: TaxonId(0),
            scientific_name: "Biota".into(),
            vernacular_name: None,
            parent: None,
            protection_level: 1,
        },
        Taxon {
            id: TaxonId(100_024),
            scientific_name: "Lynx lynx".into(),
            vernacular_name: Some("lynx".into()),
            parent: Some(TaxonId(0)),
            protection_level: 3,
        },
        Taxon {
            id: TaxonId(102_933),
            scientific_name: "Parus major".into(),
            vernacular_name: Some("great tit".into()),
            parent: Some(TaxonId(0)),
            protection_level: 1,
        },
    ]
}

/// A ready-to-run pipeline over in-memory adapters and demo providers.
pub struct DemoEnvironment {
    pub pipeline: RunPipeline,
    pub index: InMemoryIndexStore,
    pub outcomes: InMemoryOutcomeStore,
    pub active_instance: InMemoryActiveInstanceStore,
    pub providers: InMemoryProviderRegistry,
    pub followups: mpsc::UnboundedReceiver<FollowUpJob>,
}

impl std::fmt::Debug for DemoEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemoEnvironment")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl DemoEnvironment {
    pub fn new(config: &PipelineConfig) -> Self {
        let index = InMemoryIndexStore::new();
        let outcomes = InMemoryOutcomeStore::new();
        let active_instance = InMemoryActiveInstanceStore::new(InstanceId::ZERO);
        let providers = InMemoryProviderRegistry::new(demo_providers());
        let (followups_tx, followups) = ChannelFollowUpScheduler::new();

        let handlers = HandlerRegistry::builder()
            .serve_all(
                ProviderKind::ALL,
                Arc::new(DemoHarvester),
                Arc::new(DemoProcessor::new(index.clone())),
            )
            .build();

        let ports = PipelinePorts {
            providers: Arc::new(providers.clone()),
            outcomes: Arc::new(outcomes.clone()),
            index: Arc::new(index.clone()),
            active_instance: Arc::new(active_instance.clone()),
            taxonomy: Arc::new(InMemoryTaxonomyCache::new(demo_taxa())),
            areas: Arc::new(InMemoryAreaCache::default()),
            configuration: Arc::new(InMemoryConfigurationCache::default()),
            inventory: Arc::new(InMemoryJobInventory::default()),
            followups: Arc::new(followups_tx),
        };

        let pipeline =
            RunPipeline::assemble(ports, handlers, config, PipelineLocks::default()).build();

        Self {
            pipeline,
            index,
            outcomes,
            active_instance,
            providers,
            followups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ActiveInstanceStore;
    use crate::orchestration::RunRequest;
    use harvestry_model::RunOutcome;

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.process.count_poll_interval_ms = 5;
        config.process.count_timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn full_cycle_promotes_candidate() {
        let mut env = DemoEnvironment::new(&fast_config());

        let outcome = env
            .pipeline
            .run(RunRequest::new(RunMode::Full), CancellationToken::new())
            .await;

        assert!(outcome.promoted(), "unexpected outcome {outcome:?}");
        assert_eq!(env.active_instance.active().await.unwrap(), InstanceId::ONE);
        assert!(matches!(
            env.followups.try_recv(),
            Ok(FollowUpJob::RestartCursorJobs {
                stale_instance: InstanceId::ZERO
            })
        ));
    }

    #[tokio::test]
    async fn incremental_after_full_patches_live_instance() {
        let env = DemoEnvironment::new(&fast_config());
        env.pipeline
            .run(RunRequest::new(RunMode::Full), CancellationToken::new())
            .await;

        let outcome = env
            .pipeline
            .run(
                RunRequest::new(RunMode::IncrementalActiveInstance),
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(outcome, RunOutcome::Success { promoted: false, .. }));
    }
}
