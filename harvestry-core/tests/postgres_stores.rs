use anyhow::Result;
use chrono::Utc;
use harvestry_core::database::postgres::{PostgresActiveInstanceStore, PostgresOutcomeStore};
use harvestry_core::database::{ActiveInstanceStore, OutcomeStore};
use harvestry_model::{
    DatasetMetadata, HarvestOutcome, InstanceId, OutcomeStatus, ProcessOutcome, ProviderId,
    ProviderRunStats, RunMode, RunSnapshot, RunStatistics,
};
use sqlx::PgPool;

fn statistics(mode: RunMode, public: u64) -> RunStatistics {
    let started = Utc::now();
    RunStatistics::from_providers(
        mode,
        started,
        vec![ProviderRunStats {
            provider_id: ProviderId(1),
            harvest: None,
            process: Some(ProcessOutcome::success(ProviderId(1), public, 3, started)),
        }],
    )
}

#[sqlx::test(migrator = "harvestry_core::MIGRATOR")]
#[ignore = "requires a Postgres instance (DATABASE_URL)"]
async fn harvest_outcome_upsert_replaces_prior(pool: PgPool) -> Result<()> {
    let store = PostgresOutcomeStore::new(pool);
    let started = Utc::now();

    store
        .upsert_harvest_outcome(&HarvestOutcome::success(ProviderId(4), 120, started))
        .await?;
    let mut archive = HarvestOutcome::success(ProviderId(4), 130, started);
    archive.dynamic_metadata = Some(DatasetMetadata {
        title: Some("Herbarium".into()),
        ..DatasetMetadata::default()
    });
    store.upsert_harvest_outcome(&archive).await?;

    let stored = store
        .harvest_outcome(ProviderId(4))
        .await?
        .expect("outcome stored");
    assert_eq!(stored.count, 130);
    assert_eq!(stored.status, OutcomeStatus::Success);
    assert_eq!(
        stored.dynamic_metadata.and_then(|m| m.title).as_deref(),
        Some("Herbarium")
    );
    assert_eq!(store.harvest_outcomes().await?.len(), 1);
    Ok(())
}

#[sqlx::test(migrator = "harvestry_core::MIGRATOR")]
#[ignore = "requires a Postgres instance (DATABASE_URL)"]
async fn sentinel_outcome_is_refused(pool: PgPool) -> Result<()> {
    let store = PostgresOutcomeStore::new(pool);
    let outcome = HarvestOutcome::success(
        ProviderId(2),
        HarvestOutcome::EXTERNALLY_HARVESTED,
        Utc::now(),
    );

    assert!(store.upsert_harvest_outcome(&outcome).await.is_err());
    assert!(store.harvest_outcome(ProviderId(2)).await?.is_none());
    Ok(())
}

#[sqlx::test(migrator = "harvestry_core::MIGRATOR")]
#[ignore = "requires a Postgres instance (DATABASE_URL)"]
async fn run_snapshot_roundtrip_keeps_baseline(pool: PgPool) -> Result<()> {
    let store = PostgresOutcomeStore::new(pool);
    let mut snapshot = RunSnapshot::full(InstanceId::ONE, statistics(RunMode::Full, 500));
    store.upsert_run_snapshot(&snapshot).await?;

    snapshot.apply_incremental(statistics(RunMode::IncrementalActiveInstance, 4));
    store.upsert_run_snapshot(&snapshot).await?;

    let stored = store
        .run_snapshot(InstanceId::ONE)
        .await?
        .expect("snapshot stored");
    assert_eq!(stored.baseline.map(|b| b.public_count), Some(500));
    assert_eq!(stored.latest_incremental.map(|s| s.public_count), Some(4));
    assert!(store.run_snapshot(InstanceId::ZERO).await?.is_none());
    Ok(())
}

#[sqlx::test(migrator = "harvestry_core::MIGRATOR")]
#[ignore = "requires a Postgres instance (DATABASE_URL)"]
async fn active_instance_flip_is_compare_and_set(pool: PgPool) -> Result<()> {
    let store = PostgresActiveInstanceStore::new(pool);
    assert_eq!(store.active().await?, InstanceId::ZERO);

    assert!(!store.compare_and_set(InstanceId::ONE, InstanceId::ZERO).await?);
    assert!(store.compare_and_set(InstanceId::ZERO, InstanceId::ONE).await?);
    assert_eq!(store.active().await?, InstanceId::ONE);
    Ok(())
}
