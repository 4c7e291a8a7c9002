use async_trait::async_trait;
use harvestry_model::InstanceId;

use crate::error::Result;

/// The single piece of durable shared state naming the live instance.
#[async_trait]
pub trait ActiveInstanceStore: Send + Sync {
    async fn active(&self) -> Result<InstanceId>;

    /// Atomically replace `expected` with `next`. Returns `false` without
    /// writing when the stored value is not `expected`.
    async fn compare_and_set(
        &self,
        expected: InstanceId,
        next: InstanceId,
    ) -> Result<bool>;
}
