use std::fmt;
use std::sync::Arc;

use harvestry_model::{InstanceId, RunMode};
use tracing::{info, instrument, warn};

use crate::database::ActiveInstanceStore;
use crate::error::{PipelineError, Result};

use super::config::RetryConfig;
use super::retry::retry_transient;
use super::validation::ValidationReport;

/// Owner of the active/inactive flag of the two index instances.
///
/// The flag changes only through [`IndexLifecycleManager::promote`], which
/// requires a passing [`ValidationReport`] for the candidate.
#[derive(Clone)]
pub struct IndexLifecycleManager {
    store: Arc<dyn ActiveInstanceStore>,
    retry: RetryConfig,
}

impl fmt::Debug for IndexLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexLifecycleManager")
            .field("store", &"ActiveInstanceStore")
            .field("retry", &self.retry)
            .finish()
    }
}

impl IndexLifecycleManager {
    pub fn new(store: Arc<dyn ActiveInstanceStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub async fn active(&self) -> Result<InstanceId> {
        retry_transient(&self.retry, "read_active_instance", || self.store.active())
            .await
    }

    pub async fn inactive(&self) -> Result<InstanceId> {
        Ok(self.active().await?.other())
    }

    /// Instance a run of `mode` writes into.
    pub async fn target_for(&self, mode: RunMode) -> Result<InstanceId> {
        match mode {
            RunMode::IncrementalActiveInstance => self.active().await,
            RunMode::Full | RunMode::IncrementalInactiveInstance => {
                self.inactive().await
            }
        }
    }

    /// Make `candidate` the live instance.
    ///
    /// Fails without touching the flag when the report does not belong to the
    /// candidate, has failures, or another writer flipped the flag first.
    #[instrument(
        name = "lifecycle.promote",
        skip(self, report),
        fields(candidate = %candidate),
        err
    )]
    pub async fn promote(
        &self,
        candidate: InstanceId,
        report: &ValidationReport,
    ) -> Result<()> {
        if report.instance != candidate {
            return Err(PipelineError::Internal(format!(
                "validation report for instance {} cannot promote instance {}",
                report.instance, candidate
            )));
        }
        if !report.passed() {
            return Err(PipelineError::ValidationRejected {
                instance: candidate,
                reasons: report.failures.clone(),
            });
        }

        let expected = candidate.other();
        let flipped = retry_transient(&self.retry, "flip_active_instance", || {
            self.store.compare_and_set(expected, candidate)
        })
        .await?;

        if !flipped {
            let active = self.active().await?;
            if active == candidate {
                warn!(instance = %candidate, "instance already active; promotion is a no-op");
                return Ok(());
            }
            return Err(PipelineError::PromotionConflict {
                requested: candidate,
                active,
            });
        }

        info!(active = %candidate, stale = %expected, "promoted index instance");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::in_memory::InMemoryActiveInstanceStore;

    fn manager(store: Arc<InMemoryActiveInstanceStore>) -> IndexLifecycleManager {
        IndexLifecycleManager::new(store, RetryConfig::default())
    }

    #[tokio::test]
    async fn targets_follow_the_active_flag() {
        let store = Arc::new(InMemoryActiveInstanceStore::new(InstanceId::ZERO));
        let lifecycle = manager(store);

        assert_eq!(
            lifecycle.target_for(RunMode::Full).await.unwrap(),
            InstanceId::ONE
        );
        assert_eq!(
            lifecycle
                .target_for(RunMode::IncrementalActiveInstance)
                .await
                .unwrap(),
            InstanceId::ZERO
        );
        assert_eq!(
            lifecycle
                .target_for(RunMode::IncrementalInactiveInstance)
                .await
                .unwrap(),
            InstanceId::ONE
        );
    }

    #[tokio::test]
    async fn failing_report_leaves_flag_untouched() {
        let store = Arc::new(InMemoryActiveInstanceStore::new(InstanceId::ZERO));
        let lifecycle = manager(Arc::clone(&store));
        let report = ValidationReport {
            instance: InstanceId::ONE,
            failures: vec!["protected partition holds 0 documents".into()],
        };

        let err = lifecycle.promote(InstanceId::ONE, &report).await.unwrap_err();

        assert!(matches!(err, PipelineError::ValidationRejected { .. }));
        assert_eq!(store.active().await.unwrap(), InstanceId::ZERO);
        assert!(store.flips().await.is_empty());
    }

    #[tokio::test]
    async fn passing_report_flips_once() {
        let store = Arc::new(InMemoryActiveInstanceStore::new(InstanceId::ZERO));
        let lifecycle = manager(Arc::clone(&store));
        let report = ValidationReport::passing(InstanceId::ONE);

        lifecycle.promote(InstanceId::ONE, &report).await.unwrap();

        assert_eq!(store.active().await.unwrap(), InstanceId::ONE);
        assert_eq!(store.flips().await, vec![InstanceId::ONE]);
    }

    #[tokio::test]
    async fn report_for_other_instance_is_refused() {
        let store = Arc::new(InMemoryActiveInstanceStore::new(InstanceId::ONE));
        let lifecycle = manager(Arc::clone(&store));
        let report = ValidationReport::passing(InstanceId::ONE);

        assert!(lifecycle.promote(InstanceId::ZERO, &report).await.is_err());
        assert_eq!(store.active().await.unwrap(), InstanceId::ONE);
    }
}
