use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use harvestry_core::database::postgres::{PostgresActiveInstanceStore, PostgresOutcomeStore};
use harvestry_core::database::{ActiveInstanceStore, OutcomeStore};
use harvestry_model::{HarvestOutcome, InstanceId, RunSnapshot};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use crate::cli::StatusArgs;
use crate::config::Config;

#[derive(Debug, Serialize)]
pub struct InstanceStatus {
    pub instance: InstanceId,
    pub live: bool,
    pub baseline_public: Option<u64>,
    pub baseline_protected: Option<u64>,
    pub baseline_finished_at: Option<DateTime<Utc>>,
    pub latest_incremental_at: Option<DateTime<Utc>>,
}

impl InstanceStatus {
    fn from_snapshot(instance: InstanceId, live: bool, snapshot: Option<RunSnapshot>) -> Self {
        let baseline = snapshot.as_ref().and_then(|s| s.baseline.as_ref());
        let incremental = snapshot.as_ref().and_then(|s| s.latest_incremental.as_ref());
        Self {
            instance,
            live,
            baseline_public: baseline.map(|b| b.public_count),
            baseline_protected: baseline.map(|b| b.protected_count),
            baseline_finished_at: baseline.map(|b| b.ended_at),
            latest_incremental_at: incremental.map(|s| s.ended_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub live_instance: InstanceId,
    pub instances: Vec<InstanceStatus>,
    pub harvests: Vec<HarvestOutcome>,
}

#[instrument(name = "status", skip_all, err)]
pub async fn run(config: &Config, args: &StatusArgs) -> Result<()> {
    let database = config
        .database
        .as_ref()
        .context("DATABASE_URL is not configured; status reads pipeline state from Postgres")?;

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(args.connect_timeout)
        .connect(database.url.as_str())
        .await
        .with_context(|| format!("failed to connect to {}", database.redacted()))?;

    if args.migrate {
        harvestry_core::MIGRATOR
            .run(&pool)
            .await
            .context("failed to apply migrations")?;
        info!("migrations applied");
    }

    let active_store = PostgresActiveInstanceStore::new(pool.clone());
    let outcomes = PostgresOutcomeStore::new(pool.clone());

    let live_instance = active_store
        .active()
        .await
        .context("failed to read the active instance")?;

    let mut instances = Vec::with_capacity(2);
    for instance in [InstanceId::ZERO, InstanceId::ONE] {
        let snapshot = outcomes.run_snapshot(instance).await?;
        instances.push(InstanceStatus::from_snapshot(
            instance,
            instance == live_instance,
            snapshot,
        ));
    }
    let harvests = outcomes.harvest_outcomes().await?;
    pool.close().await;

    let report = StatusReport {
        live_instance,
        instances,
        harvests,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &StatusReport) {
    println!("live instance: {}", report.live_instance);
    for status in &report.instances {
        let marker = if status.live { "*" } else { " " };
        match (status.baseline_public, status.baseline_finished_at) {
            (Some(public), Some(finished)) => println!(
                "{marker} instance {}: {public} public / {} protected, full run finished {finished}",
                status.instance,
                status.baseline_protected.unwrap_or_default(),
            ),
            _ => println!("{marker} instance {}: no full run recorded", status.instance),
        }
        if let Some(at) = status.latest_incremental_at {
            println!("    last incremental {at}");
        }
    }

    if report.harvests.is_empty() {
        println!("no harvest outcomes recorded");
        return;
    }
    println!("harvest outcomes:");
    for outcome in &report.harvests {
        println!(
            "  provider {:>4}  {:<9} {:>10}  {}",
            outcome.provider_id,
            outcome.status.as_str(),
            outcome.count,
            outcome.ended_at
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvestry_model::{RunMode, RunStatistics};

    #[test]
    fn instance_status_reads_baseline_and_incremental() {
        let mut baseline = RunStatistics::from_providers(RunMode::Full, Utc::now(), Vec::new());
        baseline.public_count = 1_200;
        baseline.protected_count = 40;
        let mut snapshot = RunSnapshot::full(InstanceId::ONE, baseline);
        snapshot.apply_incremental(RunStatistics::from_providers(
            RunMode::IncrementalActiveInstance,
            Utc::now(),
            Vec::new(),
        ));

        let status = InstanceStatus::from_snapshot(InstanceId::ONE, true, Some(snapshot));

        assert_eq!(status.baseline_public, Some(1_200));
        assert_eq!(status.baseline_protected, Some(40));
        assert!(status.latest_incremental_at.is_some());
    }

    #[test]
    fn missing_snapshot_reports_nothing() {
        let status = InstanceStatus::from_snapshot(InstanceId::ZERO, false, None);
        assert!(status.baseline_public.is_none());
        assert!(status.latest_incremental_at.is_none());
    }
}
