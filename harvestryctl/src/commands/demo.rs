use anyhow::{Result, bail};
use harvestry_core::database::{ActiveInstanceStore, IndexStore};
use harvestry_core::demo::DemoEnvironment;
use harvestry_core::orchestration::{FollowUpJob, RunRequest};
use harvestry_model::{InstanceId, Partition, RunMode, RunOutcome};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::DemoArgs;
use crate::config::Config;

#[derive(Debug, Serialize)]
pub struct DemoRunReport {
    pub mode: RunMode,
    pub outcome: RunOutcome,
    pub live_instance: InstanceId,
    pub public_documents: u64,
    pub protected_documents: u64,
    pub followups: Vec<FollowUpJob>,
}

pub async fn run(config: &Config, args: &DemoArgs) -> Result<()> {
    let cancel = CancellationToken::new();

    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling demo");
                cancel.cancel();
            }
        }
    });
    let deadline = args.deadline.map(|limit| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            warn!(?limit, "demo deadline reached, cancelling");
            cancel.cancel();
        })
    });

    let reports = run_sequence(config, &args.modes, &cancel).await;

    interrupt.abort();
    if let Some(handle) = deadline {
        handle.abort();
    }
    let reports = reports?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    if let Some(failed) = reports.iter().find(|r| r.outcome.is_failed()) {
        bail!("{} run failed: {:?}", failed.mode, failed.outcome);
    }
    Ok(())
}

/// Run each mode in order against one fresh in-memory environment.
pub async fn run_sequence(
    config: &Config,
    modes: &[RunMode],
    cancel: &CancellationToken,
) -> Result<Vec<DemoRunReport>> {
    let mut env = DemoEnvironment::new(&config.pipeline);
    let mut reports = Vec::with_capacity(modes.len());

    for &mode in modes {
        if cancel.is_cancelled() {
            break;
        }

        let outcome = env
            .pipeline
            .run(RunRequest::new(mode), cancel.child_token())
            .await;

        let live_instance = env.active_instance.active().await?;
        let public_documents = env
            .index
            .count_documents(live_instance, Partition::Public)
            .await
            .unwrap_or_default();
        let protected_documents = env
            .index
            .count_documents(live_instance, Partition::Protected)
            .await
            .unwrap_or_default();

        let mut followups = Vec::new();
        while let Ok(job) = env.followups.try_recv() {
            followups.push(job);
        }

        info!(%mode, ?outcome, instance = %live_instance, public_documents, "demo run finished");
        reports.push(DemoRunReport {
            mode,
            outcome,
            live_instance,
            public_documents,
            protected_documents,
            followups,
        });
    }

    Ok(reports)
}

fn print_report(report: &DemoRunReport) {
    let outcome = match &report.outcome {
        RunOutcome::Success {
            harvested,
            promoted,
        } => format!("success: {harvested} harvested, promoted={promoted}"),
        RunOutcome::Failed { reason } => format!("failed: {reason}"),
        RunOutcome::Cancelled => "cancelled".into(),
        RunOutcome::Skipped => "skipped".into(),
    };
    println!("[{}] {outcome}", report.mode);
    println!(
        "  live instance {}: {} public / {} protected documents",
        report.live_instance, report.public_documents, report.protected_documents
    );
    for job in &report.followups {
        println!("  follow-up: {job:?}");
    }
}
