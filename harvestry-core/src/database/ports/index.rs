use async_trait::async_trait;
use harvestry_model::{
    BusinessKey, ClusterHealth, DocumentId, DuplicateGroup, IndexedDocument,
    InstanceId, Partition,
};

use crate::error::Result;
use crate::orchestration::config::IndexSchema;

/// Physical search index holding both instances and their partitions.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn instance_exists(&self, instance: InstanceId) -> Result<bool>;

    async fn create_instance(
        &self,
        instance: InstanceId,
        schema: &IndexSchema,
    ) -> Result<()>;

    /// Drop every partition of the instance.
    async fn clear_instance(&self, instance: InstanceId) -> Result<()>;

    async fn set_refresh(&self, instance: InstanceId, enabled: bool) -> Result<()>;

    async fn count_documents(
        &self,
        instance: InstanceId,
        partition: Partition,
    ) -> Result<u64>;

    async fn health(&self) -> Result<ClusterHealth>;

    async fn disk_usage_percent(&self) -> Result<f64>;

    /// Up to `limit` groups of documents sharing a business key.
    async fn find_duplicates(
        &self,
        instance: InstanceId,
        partition: Partition,
        limit: usize,
    ) -> Result<Vec<DuplicateGroup>>;

    async fn delete_documents(
        &self,
        instance: InstanceId,
        partition: Partition,
        ids: &[DocumentId],
    ) -> Result<u64>;

    /// True when every document in the partition carries the protection level
    /// the partition demands.
    async fn validate_protection_level(
        &self,
        instance: InstanceId,
        partition: Partition,
    ) -> Result<bool>;

    async fn sample_documents(
        &self,
        instance: InstanceId,
        partition: Partition,
        size: usize,
    ) -> Result<Vec<IndexedDocument>>;

    async fn find_by_business_keys(
        &self,
        instance: InstanceId,
        partition: Partition,
        keys: &[BusinessKey],
    ) -> Result<Vec<IndexedDocument>>;
}
