//! Consistency checks a candidate instance must pass before promotion.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use harvestry_model::{
    BusinessKey, ClusterHealth, Coordinates, InstanceId, Partition, ProviderId,
    RunStatistics,
};
use tracing::{info, instrument, warn};

use crate::database::{IndexStore, OutcomeStore};
use crate::error::Result;

use super::config::ValidationConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckVerdict {
    Pass,
    Fail(String),
}

#[async_trait]
pub trait ValidationCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, candidate: InstanceId) -> Result<CheckVerdict>;
}

/// Outcome of running every check against one instance. Only a report with no
/// failures can promote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub instance: InstanceId,
    pub failures: Vec<String>,
}

impl ValidationReport {
    pub fn passing(instance: InstanceId) -> Self {
        Self {
            instance,
            failures: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct ValidationGate {
    checks: Vec<Arc<dyn ValidationCheck>>,
}

impl fmt::Debug for ValidationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationGate")
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ValidationGate {
    pub fn new(checks: Vec<Arc<dyn ValidationCheck>>) -> Self {
        Self { checks }
    }

    /// Every built-in check, configured from `config`.
    pub fn standard(
        index: Arc<dyn IndexStore>,
        outcomes: Arc<dyn OutcomeStore>,
        config: &ValidationConfig,
    ) -> Self {
        Self::new(vec![
            Arc::new(ClusterHealthCheck {
                index: Arc::clone(&index),
                allow_yellow: config.allow_yellow_health,
            }),
            Arc::new(DocumentCountCheck {
                index: Arc::clone(&index),
                min_public: config.min_public_count,
                min_protected: config.min_protected_count,
            }),
            Arc::new(DiskUsageCheck {
                index: Arc::clone(&index),
                max_percent: config.max_disk_usage_percent,
            }),
            Arc::new(DuplicateCheck {
                index: Arc::clone(&index),
            }),
            Arc::new(SensitiveLeakCheck {
                index: Arc::clone(&index),
                sample_size: config.sensitive_sample_size,
            }),
            Arc::new(ProtectionLevelCheck {
                index: Arc::clone(&index),
            }),
            Arc::new(ProviderRegressionCheck {
                outcomes,
                tolerance_percent: config.regression_tolerance_percent,
            }),
        ])
    }

    pub fn with_check(mut self, check: Arc<dyn ValidationCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Run all checks concurrently. A check that errors counts as failed.
    #[instrument(name = "validation.gate", skip(self), fields(candidate = %candidate))]
    pub async fn validate(&self, candidate: InstanceId) -> ValidationReport {
        let verdicts = join_all(self.checks.iter().map(|check| async move {
            (check.name(), check.check(candidate).await)
        }))
        .await;

        let mut failures = Vec::new();
        for (name, verdict) in verdicts {
            match verdict {
                Ok(CheckVerdict::Pass) => {}
                Ok(CheckVerdict::Fail(reason)) => {
                    warn!(check = name, reason = %reason, "validation check failed");
                    failures.push(format!("{name}: {reason}"));
                }
                Err(err) => {
                    warn!(check = name, error = %err, "validation check errored");
                    failures.push(format!("{name}: check errored: {err}"));
                }
            }
        }

        let report = ValidationReport {
            instance: candidate,
            failures,
        };
        info!(passed = report.passed(), failures = report.failures.len(), "validation finished");
        report
    }
}

pub struct ClusterHealthCheck {
    pub index: Arc<dyn IndexStore>,
    pub allow_yellow: bool,
}

impl fmt::Debug for ClusterHealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterHealthCheck")
            .field("allow_yellow", &self.allow_yellow)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ValidationCheck for ClusterHealthCheck {
    fn name(&self) -> &'static str {
        "cluster_health"
    }

    async fn check(&self, _candidate: InstanceId) -> Result<CheckVerdict> {
        let health = self.index.health().await?;
        let ok = match health {
            ClusterHealth::Green => true,
            ClusterHealth::Yellow => self.allow_yellow,
            ClusterHealth::Red => false,
        };
        Ok(if ok {
            CheckVerdict::Pass
        } else {
            CheckVerdict::Fail(format!("cluster health is {health}"))
        })
    }
}

/// Each partition must hold at least its configured minimum.
pub struct DocumentCountCheck {
    pub index: Arc<dyn IndexStore>,
    pub min_public: u64,
    pub min_protected: u64,
}

impl fmt::Debug for DocumentCountCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCountCheck")
            .field("min_public", &self.min_public)
            .field("min_protected", &self.min_protected)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ValidationCheck for DocumentCountCheck {
    fn name(&self) -> &'static str {
        "document_count"
    }

    async fn check(&self, candidate: InstanceId) -> Result<CheckVerdict> {
        let public = self
            .index
            .count_documents(candidate, Partition::Public)
            .await?;
        let protected = self
            .index
            .count_documents(candidate, Partition::Protected)
            .await?;

        let mut problems = Vec::new();
        if public < self.min_public {
            problems.push(format!(
                "public partition holds {public} documents (minimum {})",
                self.min_public
            ));
        }
        if protected < self.min_protected {
            problems.push(format!(
                "protected partition holds {protected} documents (minimum {})",
                self.min_protected
            ));
        }
        Ok(verdict(problems))
    }
}

pub struct DiskUsageCheck {
    pub index: Arc<dyn IndexStore>,
    pub max_percent: f64,
}

impl fmt::Debug for DiskUsageCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskUsageCheck")
            .field("max_percent", &self.max_percent)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ValidationCheck for DiskUsageCheck {
    fn name(&self) -> &'static str {
        "disk_usage"
    }

    async fn check(&self, _candidate: InstanceId) -> Result<CheckVerdict> {
        let used = self.index.disk_usage_percent().await?;
        Ok(if used < self.max_percent {
            CheckVerdict::Pass
        } else {
            CheckVerdict::Fail(format!(
                "disk usage {used:.1}% is at or above {:.1}%",
                self.max_percent
            ))
        })
    }
}

pub struct DuplicateCheck {
    pub index: Arc<dyn IndexStore>,
}

impl fmt::Debug for DuplicateCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateCheck")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ValidationCheck for DuplicateCheck {
    fn name(&self) -> &'static str {
        "duplicates"
    }

    async fn check(&self, candidate: InstanceId) -> Result<CheckVerdict> {
        let mut problems = Vec::new();
        for partition in Partition::ALL {
            let groups = self.index.find_duplicates(candidate, partition, 1).await?;
            if let Some(group) = groups.first() {
                problems.push(format!(
                    "{partition} partition has duplicate business key {}",
                    group.business_key
                ));
            }
        }
        Ok(verdict(problems))
    }
}

/// Samples protected documents and fails when the public copy of any of them
/// carries the same exact coordinates.
pub struct SensitiveLeakCheck {
    pub index: Arc<dyn IndexStore>,
    pub sample_size: usize,
}

impl fmt::Debug for SensitiveLeakCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensitiveLeakCheck")
            .field("sample_size", &self.sample_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ValidationCheck for SensitiveLeakCheck {
    fn name(&self) -> &'static str {
        "sensitive_leak"
    }

    async fn check(&self, candidate: InstanceId) -> Result<CheckVerdict> {
        let sample = self
            .index
            .sample_documents(candidate, Partition::Protected, self.sample_size)
            .await?;

        let protected: HashMap<BusinessKey, Coordinates> = sample
            .into_iter()
            .filter_map(|doc| doc.location.map(|loc| (doc.business_key, loc)))
            .collect();
        if protected.is_empty() {
            return Ok(CheckVerdict::Pass);
        }

        let keys: Vec<BusinessKey> = protected.keys().cloned().collect();
        let public = self
            .index
            .find_by_business_keys(candidate, Partition::Public, &keys)
            .await?;

        let leaked: Vec<BusinessKey> = public
            .into_iter()
            .filter(|doc| {
                matches!(
                    (doc.location, protected.get(&doc.business_key)),
                    (Some(shown), Some(hidden)) if shown == *hidden
                )
            })
            .map(|doc| doc.business_key)
            .collect();

        Ok(if leaked.is_empty() {
            CheckVerdict::Pass
        } else {
            CheckVerdict::Fail(format!(
                "{} public documents expose protected coordinates (first: {})",
                leaked.len(),
                leaked[0]
            ))
        })
    }
}

pub struct ProtectionLevelCheck {
    pub index: Arc<dyn IndexStore>,
}

impl fmt::Debug for ProtectionLevelCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionLevelCheck")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ValidationCheck for ProtectionLevelCheck {
    fn name(&self) -> &'static str {
        "protection_level"
    }

    async fn check(&self, candidate: InstanceId) -> Result<CheckVerdict> {
        let mut problems = Vec::new();
        for partition in Partition::ALL {
            if !self
                .index
                .validate_protection_level(candidate, partition)
                .await?
            {
                problems.push(format!(
                    "{partition} partition holds documents with the wrong protection level"
                ));
            }
        }
        Ok(verdict(problems))
    }
}

/// Compares per-provider counts of the candidate's Full baseline with the
/// baseline of the instance currently serving traffic.
pub struct ProviderRegressionCheck {
    pub outcomes: Arc<dyn OutcomeStore>,
    pub tolerance_percent: u8,
}

impl fmt::Debug for ProviderRegressionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegressionCheck")
            .field("tolerance_percent", &self.tolerance_percent)
            .finish_non_exhaustive()
    }
}

impl ProviderRegressionCheck {
    fn regressions(&self, previous: &RunStatistics, current: &RunStatistics) -> Vec<String> {
        let tolerance = u64::from(self.tolerance_percent.min(100));
        let floor = |count: u64| count.saturating_mul(tolerance) / 100;
        let current_counts: HashMap<ProviderId, (u64, u64)> = current
            .providers
            .iter()
            .map(|p| (p.provider_id, (p.public_count(), p.protected_count())))
            .collect();

        let mut problems = Vec::new();
        for before in previous.providers.iter().filter(|p| p.processed_successfully()) {
            let (public, protected) = current_counts
                .get(&before.provider_id)
                .copied()
                .unwrap_or_default();
            if public < floor(before.public_count()) {
                problems.push(format!(
                    "provider {} public count {public} fell below {tolerance}% of {}",
                    before.provider_id,
                    before.public_count()
                ));
            }
            if protected < floor(before.protected_count()) {
                problems.push(format!(
                    "provider {} protected count {protected} fell below {tolerance}% of {}",
                    before.provider_id,
                    before.protected_count()
                ));
            }
        }
        problems
    }
}

#[async_trait]
impl ValidationCheck for ProviderRegressionCheck {
    fn name(&self) -> &'static str {
        "provider_regression"
    }

    async fn check(&self, candidate: InstanceId) -> Result<CheckVerdict> {
        let Some(previous) = self
            .outcomes
            .run_snapshot(candidate.other())
            .await?
            .and_then(|s| s.baseline)
        else {
            return Ok(CheckVerdict::Pass);
        };
        let Some(current) = self
            .outcomes
            .run_snapshot(candidate)
            .await?
            .and_then(|s| s.baseline)
        else {
            return Ok(CheckVerdict::Fail(format!(
                "instance {candidate} has no run snapshot to compare"
            )));
        };

        Ok(verdict(self.regressions(&previous, &current)))
    }
}

fn verdict(problems: Vec<String>) -> CheckVerdict {
    if problems.is_empty() {
        CheckVerdict::Pass
    } else {
        CheckVerdict::Fail(problems.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::in_memory::{InMemoryIndexStore, InMemoryOutcomeStore};
    use chrono::Utc;
    use harvestry_model::{
        DocumentId, IndexedDocument, ProcessOutcome, ProviderRunStats, RunMode,
        RunSnapshot,
    };

    fn doc(key: &str, protected: bool, location: Option<(f64, f64)>) -> IndexedDocument {
        IndexedDocument {
            id: DocumentId(format!("{key}-{}", if protected { "p" } else { "o" })),
            business_key: key.into(),
            location: location.map(|(latitude, longitude)| Coordinates {
                latitude,
                longitude,
            }),
            modified: Utc::now(),
            protected,
        }
    }

    fn gate(
        index: &Arc<InMemoryIndexStore>,
        outcomes: &Arc<InMemoryOutcomeStore>,
    ) -> ValidationGate {
        ValidationGate::standard(
            Arc::clone(index) as Arc<dyn IndexStore>,
            Arc::clone(outcomes) as Arc<dyn OutcomeStore>,
            &ValidationConfig::default(),
        )
    }

    async fn seeded_index() -> Arc<InMemoryIndexStore> {
        let index = Arc::new(InMemoryIndexStore::new());
        index
            .insert(InstanceId::ONE, Partition::Public, doc("a", false, Some((59.3, 18.1))))
            .await;
        index
            .insert(InstanceId::ONE, Partition::Protected, doc("b", true, Some((57.7, 11.9))))
            .await;
        index
            .insert(InstanceId::ONE, Partition::Public, doc("b", false, Some((57.5, 12.0))))
            .await;
        index
    }

    #[tokio::test]
    async fn healthy_candidate_passes() {
        let index = seeded_index().await;
        let outcomes = Arc::new(InMemoryOutcomeStore::new());

        let report = gate(&index, &outcomes).validate(InstanceId::ONE).await;

        assert!(report.passed(), "unexpected failures: {:?}", report.failures);
    }

    #[tokio::test]
    async fn empty_protected_partition_fails() {
        let index = Arc::new(InMemoryIndexStore::new());
        index
            .insert(InstanceId::ONE, Partition::Public, doc("a", false, None))
            .await;
        let outcomes = Arc::new(InMemoryOutcomeStore::new());

        let report = gate(&index, &outcomes).validate(InstanceId::ONE).await;

        assert!(!report.passed());
        assert!(report.failures.iter().any(|f| f.starts_with("document_count")));
    }

    #[test]
    fn checks_debug_without_their_ports() {
        let index = Arc::new(InMemoryIndexStore::new()) as Arc<dyn IndexStore>;
        let disk = DiskUsageCheck {
            index: Arc::clone(&index),
            max_percent: 85.0,
        };
        let leak = SensitiveLeakCheck {
            index,
            sample_size: 50,
        };

        assert_eq!(format!("{disk:?}"), "DiskUsageCheck { max_percent: 85.0, .. }");
        assert_eq!(format!("{leak:?}"), "SensitiveLeakCheck { sample_size: 50, .. }");
    }

    #[tokio::test]
    async fn document_minimums_are_inclusive() {
        let index = Arc::new(InMemoryIndexStore::new());
        index
            .insert(InstanceId::ONE, Partition::Public, doc("a", false, None))
            .await;
        index
            .insert(InstanceId::ONE, Partition::Public, doc("b", false, None))
            .await;
        index
            .insert(InstanceId::ONE, Partition::Protected, doc("c", true, None))
            .await;
        let check = DocumentCountCheck {
            index: Arc::clone(&index) as Arc<dyn IndexStore>,
            min_public: 2,
            min_protected: 2,
        };

        let verdict = check.check(InstanceId::ONE).await.unwrap();

        let CheckVerdict::Fail(reason) = verdict else {
            panic!("protected partition below its minimum should fail");
        };
        assert!(reason.contains("protected partition holds 1"), "{reason}");
        assert!(!reason.contains("public partition"), "{reason}");
    }

    #[tokio::test]
    async fn duplicates_fail_validation() {
        let index = seeded_index().await;
        let mut dup = doc("a", false, None);
        dup.id = DocumentId("a-copy".into());
        index.insert(InstanceId::ONE, Partition::Public, dup).await;
        let outcomes = Arc::new(InMemoryOutcomeStore::new());

        let report = gate(&index, &outcomes).validate(InstanceId::ONE).await;

        assert!(report.failures.iter().any(|f| f.starts_with("duplicates")));
    }

    #[tokio::test]
    async fn leaked_coordinates_fail_validation() {
        let index = seeded_index().await;
        index
            .insert(InstanceId::ONE, Partition::Protected, doc("c", true, Some((60.0, 15.0))))
            .await;
        index
            .insert(InstanceId::ONE, Partition::Public, doc("c", false, Some((60.0, 15.0))))
            .await;
        let outcomes = Arc::new(InMemoryOutcomeStore::new());

        let report = gate(&index, &outcomes).validate(InstanceId::ONE).await;

        assert!(report.failures.iter().any(|f| f.starts_with("sensitive_leak")));
    }

    #[tokio::test]
    async fn red_cluster_and_full_disk_fail() {
        let index = seeded_index().await;
        index.set_health(ClusterHealth::Red).await;
        index.set_disk_usage(91.0).await;
        let outcomes = Arc::new(InMemoryOutcomeStore::new());

        let report = gate(&index, &outcomes).validate(InstanceId::ONE).await;

        assert!(report.failures.iter().any(|f| f.starts_with("cluster_health")));
        assert!(report.failures.iter().any(|f| f.starts_with("disk_usage")));
    }

    fn baseline(instance: InstanceId, public: u64, protected: u64) -> RunSnapshot {
        let started = Utc::now();
        RunSnapshot::full(
            instance,
            RunStatistics::from_providers(
                RunMode::Full,
                started,
                vec![ProviderRunStats {
                    provider_id: ProviderId(7),
                    harvest: None,
                    process: Some(ProcessOutcome::success(
                        ProviderId(7),
                        public,
                        protected,
                        started,
                    )),
                }],
            ),
        )
    }

    #[tokio::test]
    async fn provider_regression_checks_both_partitions() {
        let outcomes = Arc::new(InMemoryOutcomeStore::new());
        outcomes
            .upsert_run_snapshot(&baseline(InstanceId::ZERO, 1_000, 100))
            .await
            .unwrap();
        let check = ProviderRegressionCheck {
            outcomes: Arc::clone(&outcomes) as Arc<dyn OutcomeStore>,
            tolerance_percent: 80,
        };

        outcomes
            .upsert_run_snapshot(&baseline(InstanceId::ONE, 900, 85))
            .await
            .unwrap();
        assert_eq!(check.check(InstanceId::ONE).await.unwrap(), CheckVerdict::Pass);

        outcomes
            .upsert_run_snapshot(&baseline(InstanceId::ONE, 900, 10))
            .await
            .unwrap();
        let CheckVerdict::Fail(reason) = check.check(InstanceId::ONE).await.unwrap() else {
            panic!("protected regression should fail");
        };
        assert!(reason.contains("protected count 10"));
    }

    #[tokio::test]
    async fn regression_check_passes_without_previous_run() {
        let outcomes = Arc::new(InMemoryOutcomeStore::new());
        let check = ProviderRegressionCheck {
            outcomes: Arc::clone(&outcomes) as Arc<dyn OutcomeStore>,
            tolerance_percent: 80,
        };

        assert_eq!(check.check(InstanceId::ONE).await.unwrap(), CheckVerdict::Pass);
    }
}
