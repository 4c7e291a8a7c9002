#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvestry_core::database::in_memory::{
    InMemoryActiveInstanceStore, InMemoryAreaCache, InMemoryConfigurationCache,
    InMemoryIndexStore, InMemoryOutcomeStore, InMemoryProviderRegistry,
    InMemoryTaxonomyCache,
};
use harvestry_core::database::IndexStore;
use harvestry_core::orchestration::{
    ChannelFollowUpScheduler, FollowUpJob, HandlerRegistry, Harvester,
    InMemoryJobInventory, IndexSchema, PipelineConfig, PipelineLocks, PipelinePorts,
    Processor, RunPipelineBuilder, TrailingIncremental,
};
use harvestry_core::{PipelineError, Result};
use harvestry_model::{
    Coordinates, DatasetMetadata, DocumentId, HarvestOutcome, IndexedDocument, InstanceId,
    Partition, ProcessOutcome, Provider, ProviderId, ProviderKind, RunMode, Taxon, TaxonId,
    TaxonomySnapshot,
};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub enum HarvestScript {
    Count(i64),
    Fail(&'static str),
    Panic,
    /// Park until notified, then report the count.
    WaitFor(Arc<Notify>, i64),
    /// Park until the run is cancelled.
    BlockUntilCancelled,
    /// Success carrying dataset metadata, as an archive harvest reports it.
    Archive(i64),
}

#[derive(Clone, Debug)]
pub enum ProcessScript {
    Write { public: u64, protected: u64 },
    /// Public copy of a protected record keeping its exact coordinates.
    Leak,
    /// Two public documents sharing one business key.
    Duplicate,
    Fail(&'static str),
    Panic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarvestCall {
    pub provider: ProviderId,
    pub mode: RunMode,
    pub from_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessCall {
    pub provider: ProviderId,
    pub mode: RunMode,
    pub instance: InstanceId,
}

#[derive(Default)]
pub struct ScriptedHarvester {
    scripts: Mutex<HashMap<ProviderId, HarvestScript>>,
    calls: Mutex<Vec<HarvestCall>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHarvester {
    pub fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub async fn script(&self, provider: i32, script: HarvestScript) {
        self.scripts.lock().await.insert(ProviderId(provider), script);
    }

    pub async fn calls(&self) -> Vec<HarvestCall> {
        self.calls.lock().await.clone()
    }

    async fn run(
        &self,
        provider: &Provider,
        mode: RunMode,
        from_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        let started_at = Utc::now();
        self.calls.lock().await.push(HarvestCall {
            provider: provider.id,
            mode,
            from_date,
        });
        self.events
            .lock()
            .await
            .push(format!("harvest:{}", provider.id));

        let script = self
            .scripts
            .lock()
            .await
            .get(&provider.id)
            .cloned()
            .unwrap_or(HarvestScript::Count(10));

        match script {
            HarvestScript::Count(count) => {
                Ok(HarvestOutcome::success(provider.id, count, started_at))
            }
            HarvestScript::Fail(reason) => Err(PipelineError::Provider {
                provider: provider.id,
                message: reason.into(),
            }),
            HarvestScript::Panic => panic!("harvester for {} exploded", provider.id),
            HarvestScript::WaitFor(notify, count) => {
                notify.notified().await;
                Ok(HarvestOutcome::success(provider.id, count, started_at))
            }
            HarvestScript::BlockUntilCancelled => {
                cancel.cancelled().await;
                Err(PipelineError::Cancelled("scripted harvest".into()))
            }
            HarvestScript::Archive(count) => {
                let mut outcome = HarvestOutcome::success(provider.id, count, started_at);
                outcome.dynamic_metadata = Some(DatasetMetadata {
                    title: Some(format!("archive of provider {}", provider.id)),
                    ..DatasetMetadata::default()
                });
                Ok(outcome)
            }
        }
    }
}

#[async_trait]
impl Harvester for ScriptedHarvester {
    async fn harvest_full(
        &self,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        self.run(provider, RunMode::Full, None, cancel).await
    }

    async fn harvest_incremental(
        &self,
        provider: &Provider,
        mode: RunMode,
        from_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        self.run(provider, mode, from_date, cancel).await
    }

    async fn harvest_from_archive(
        &self,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome> {
        self.run(provider, RunMode::Full, None, cancel).await
    }
}

pub struct ScriptedProcessor {
    index: InMemoryIndexStore,
    scripts: Mutex<HashMap<ProviderId, ProcessScript>>,
    calls: Mutex<Vec<ProcessCall>>,
}

impl ScriptedProcessor {
    pub fn new(index: InMemoryIndexStore) -> Self {
        Self {
            index,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn script(&self, provider: i32, script: ProcessScript) {
        self.scripts.lock().await.insert(ProviderId(provider), script);
    }

    pub async fn calls(&self) -> Vec<ProcessCall> {
        self.calls.lock().await.clone()
    }

    async fn write(
        &self,
        instance: InstanceId,
        partition: Partition,
        key: String,
        suffix: &str,
        location: Option<Coordinates>,
    ) {
        self.index
            .insert(
                instance,
                partition,
                IndexedDocument {
                    id: DocumentId(format!("{key}#{suffix}")),
                    business_key: key,
                    location,
                    modified: Utc::now(),
                    protected: partition == Partition::Protected,
                },
            )
            .await;
    }
}

#[async_trait]
impl Processor for ScriptedProcessor {
    async fn process(
        &self,
        provider: &Provider,
        _taxonomy: &TaxonomySnapshot,
        mode: RunMode,
        instance: InstanceId,
        _cancel: &CancellationToken,
    ) -> Result<ProcessOutcome> {
        let started_at = Utc::now();
        self.calls.lock().await.push(ProcessCall {
            provider: provider.id,
            mode,
            instance,
        });

        let script = self
            .scripts
            .lock()
            .await
            .get(&provider.id)
            .cloned()
            .unwrap_or(ProcessScript::Write {
                public: 10,
                protected: 2,
            });
        let pid = provider.id;
        let spot = Coordinates {
            latitude: 58.4109,
            longitude: 15.6216,
        };

        match script {
            ProcessScript::Write { public, protected } => {
                for i in 0..public {
                    self.write(instance, Partition::Public, format!("o{pid}-{i}"), "pub", None)
                        .await;
                }
                for i in 0..protected {
                    self.write(
                        instance,
                        Partition::Protected,
                        format!("s{pid}-{i}"),
                        "prot",
                        Some(spot),
                    )
                    .await;
                }
                Ok(ProcessOutcome::success(pid, public, protected, started_at))
            }
            ProcessScript::Leak => {
                let key = format!("leak{pid}");
                self.write(instance, Partition::Protected, key.clone(), "prot", Some(spot))
                    .await;
                self.write(instance, Partition::Public, key, "pub", Some(spot))
                    .await;
                Ok(ProcessOutcome::success(pid, 1, 1, started_at))
            }
            ProcessScript::Duplicate => {
                let key = format!("dup{pid}");
                self.write(instance, Partition::Public, key.clone(), "a", None)
                    .await;
                self.write(instance, Partition::Public, key, "b", None).await;
                self.write(instance, Partition::Protected, format!("s{pid}"), "prot", Some(spot))
                    .await;
                Ok(ProcessOutcome::success(pid, 1, 1, started_at))
            }
            ProcessScript::Fail(reason) => Err(PipelineError::Provider {
                provider: pid,
                message: reason.into(),
            }),
            ProcessScript::Panic => panic!("processor for {pid} exploded"),
        }
    }
}

pub fn taxa() -> Vec<Taxon> {
    vec![Taxon {
        id: TaxonId(100_024),
        scientific_name: "Lynx lynx".into(),
        vernacular_name: Some("lynx".into()),
        parent: None,
        protection_level: 3,
    }]
}

/// Test configuration: fast count polling, no trailing incremental pass.
pub fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.process.count_poll_interval_ms = 5;
    config.process.count_timeout_secs = 1;
    config.process.trailing_incremental = TrailingIncremental::Off;
    config.retry.backoff_base_ms = 1;
    config.retry.backoff_max_ms = 5;
    config
}

/// All in-memory collaborators of a pipeline, kept around for assertions.
pub struct Harness {
    pub index: InMemoryIndexStore,
    pub outcomes: InMemoryOutcomeStore,
    pub active: InMemoryActiveInstanceStore,
    pub providers: InMemoryProviderRegistry,
    pub taxonomy: InMemoryTaxonomyCache,
    pub configuration: InMemoryConfigurationCache,
    pub inventory: InMemoryJobInventory,
    pub harvester: Arc<ScriptedHarvester>,
    pub processor: Arc<ScriptedProcessor>,
    pub events: Arc<Mutex<Vec<String>>>,
    followups_tx: ChannelFollowUpScheduler,
    pub followups: mpsc::UnboundedReceiver<FollowUpJob>,
}

impl Harness {
    /// Instance 0 live and populated-empty; `providers` registered.
    pub async fn new(providers: Vec<Provider>) -> Self {
        Self::with_taxa(providers, taxa()).await
    }

    pub async fn with_taxa(providers: Vec<Provider>, taxa: Vec<Taxon>) -> Self {
        let index = InMemoryIndexStore::new();
        index
            .create_instance(InstanceId::ZERO, &IndexSchema::default())
            .await
            .expect("create live instance");
        let events = Arc::new(Mutex::new(Vec::new()));
        let (followups_tx, followups) = ChannelFollowUpScheduler::new();

        Self {
            harvester: Arc::new(ScriptedHarvester::new(Arc::clone(&events))),
            processor: Arc::new(ScriptedProcessor::new(index.clone())),
            index,
            outcomes: InMemoryOutcomeStore::new(),
            active: InMemoryActiveInstanceStore::new(InstanceId::ZERO),
            providers: InMemoryProviderRegistry::new(providers),
            taxonomy: InMemoryTaxonomyCache::new(taxa),
            configuration: InMemoryConfigurationCache::default(),
            inventory: InMemoryJobInventory::default(),
            events,
            followups_tx,
            followups,
        }
    }

    pub fn handlers(&self) -> HandlerRegistry {
        HandlerRegistry::builder()
            .serve_all(
                ProviderKind::ALL,
                Arc::clone(&self.harvester) as Arc<dyn Harvester>,
                Arc::clone(&self.processor) as Arc<dyn Processor>,
            )
            .build()
    }

    pub fn ports(&self) -> PipelinePorts {
        PipelinePorts {
            providers: Arc::new(self.providers.clone()),
            outcomes: Arc::new(self.outcomes.clone()),
            index: Arc::new(self.index.clone()),
            active_instance: Arc::new(self.active.clone()),
            taxonomy: Arc::new(self.taxonomy.clone()),
            areas: Arc::new(InMemoryAreaCache::default()),
            configuration: Arc::new(self.configuration.clone()),
            inventory: Arc::new(self.inventory.clone()),
            followups: Arc::new(self.followups_tx.clone()),
        }
    }

    pub fn pipeline(&self, config: &PipelineConfig) -> RunPipelineBuilder {
        harvestry_core::orchestration::RunPipeline::assemble(
            self.ports(),
            self.handlers(),
            config,
            PipelineLocks::default(),
        )
    }

    pub fn drain_followups(&mut self) -> Vec<FollowUpJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.followups.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}

pub fn provider(id: i32) -> Provider {
    Provider::new(id, ProviderKind::Artportalen, format!("provider-{id}"))
}
