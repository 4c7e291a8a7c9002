use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use harvestry_model::{
    BusinessKey, ClusterHealth, DocumentId, DuplicateGroup, IndexedDocument,
    InstanceId, Partition,
};
use rand::seq::IndexedRandom;
use tokio::sync::Mutex;

use crate::database::ports::IndexStore;
use crate::error::Result;
use crate::orchestration::config::IndexSchema;

#[derive(Debug, Default)]
struct InstanceState {
    schema: Option<IndexSchema>,
    refresh: bool,
    public: Vec<IndexedDocument>,
    protected: Vec<IndexedDocument>,
}

impl InstanceState {
    fn partition(&self, partition: Partition) -> &Vec<IndexedDocument> {
        match partition {
            Partition::Public => &self.public,
            Partition::Protected => &self.protected,
        }
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut Vec<IndexedDocument> {
        match partition {
            Partition::Public => &mut self.public,
            Partition::Protected => &mut self.protected,
        }
    }
}

#[derive(Debug)]
struct IndexState {
    instances: HashMap<InstanceId, InstanceState>,
    health: ClusterHealth,
    disk_usage_percent: f64,
}

/// Index held in memory. Documents are visible immediately regardless of the
/// refresh flag, which is only recorded.
#[derive(Clone, Debug)]
pub struct InMemoryIndexStore {
    state: Arc<Mutex<IndexState>>,
}

impl Default for InMemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(IndexState {
                instances: HashMap::new(),
                health: ClusterHealth::Green,
                disk_usage_percent: 40.0,
            })),
        }
    }

    /// Write a document, creating the instance when needed.
    pub async fn insert(
        &self,
        instance: InstanceId,
        partition: Partition,
        document: IndexedDocument,
    ) {
        let mut guard = self.state.lock().await;
        guard
            .instances
            .entry(instance)
            .or_default()
            .partition_mut(partition)
            .push(document);
    }

    pub async fn documents(
        &self,
        instance: InstanceId,
        partition: Partition,
    ) -> Vec<IndexedDocument> {
        let guard = self.state.lock().await;
        guard
            .instances
            .get(&instance)
            .map(|state| state.partition(partition).clone())
            .unwrap_or_default()
    }

    pub async fn set_health(&self, health: ClusterHealth) {
        self.state.lock().await.health = health;
    }

    pub async fn set_disk_usage(&self, percent: f64) {
        self.state.lock().await.disk_usage_percent = percent;
    }

    /// `None` when the instance does not exist.
    pub async fn refresh_enabled(&self, instance: InstanceId) -> Option<bool> {
        let guard = self.state.lock().await;
        guard.instances.get(&instance).map(|state| state.refresh)
    }

    pub async fn schema(&self, instance: InstanceId) -> Option<IndexSchema> {
        let guard = self.state.lock().await;
        guard
            .instances
            .get(&instance)
            .and_then(|state| state.schema.clone())
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn instance_exists(&self, instance: InstanceId) -> Result<bool> {
        Ok(self.state.lock().await.instances.contains_key(&instance))
    }

    async fn create_instance(
        &self,
        instance: InstanceId,
        schema: &IndexSchema,
    ) -> Result<()> {
        let mut guard = self.state.lock().await;
        guard.instances.insert(
            instance,
            InstanceState {
                schema: Some(schema.clone()),
                refresh: true,
                ..InstanceState::default()
            },
        );
        Ok(())
    }

    async fn clear_instance(&self, instance: InstanceId) -> Result<()> {
        self.state.lock().await.instances.remove(&instance);
        Ok(())
    }

    async fn set_refresh(&self, instance: InstanceId, enabled: bool) -> Result<()> {
        let mut guard = self.state.lock().await;
        if let Some(state) = guard.instances.get_mut(&instance) {
            state.refresh = enabled;
        }
        Ok(())
    }

    async fn count_documents(
        &self,
        instance: InstanceId,
        partition: Partition,
    ) -> Result<u64> {
        let guard = self.state.lock().await;
        Ok(guard
            .instances
            .get(&instance)
            .map_or(0, |state| state.partition(partition).len() as u64))
    }

    async fn health(&self) -> Result<ClusterHealth> {
        Ok(self.state.lock().await.health)
    }

    async fn disk_usage_percent(&self) -> Result<f64> {
        Ok(self.state.lock().await.disk_usage_percent)
    }

    async fn find_duplicates(
        &self,
        instance: InstanceId,
        partition: Partition,
        limit: usize,
    ) -> Result<Vec<DuplicateGroup>> {
        let guard = self.state.lock().await;
        let Some(state) = guard.instances.get(&instance) else {
            return Ok(Vec::new());
        };

        let mut by_key: BTreeMap<&BusinessKey, Vec<IndexedDocument>> = BTreeMap::new();
        for doc in state.partition(partition) {
            by_key.entry(&doc.business_key).or_default().push(doc.clone());
        }
        Ok(by_key
            .into_iter()
            .filter(|(_, docs)| docs.len() > 1)
            .take(limit)
            .map(|(key, documents)| DuplicateGroup {
                business_key: key.clone(),
                documents,
            })
            .collect())
    }

    async fn delete_documents(
        &self,
        instance: InstanceId,
        partition: Partition,
        ids: &[DocumentId],
    ) -> Result<u64> {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.instances.get_mut(&instance) else {
            return Ok(0);
        };
        let doomed: HashSet<&DocumentId> = ids.iter().collect();
        let docs = state.partition_mut(partition);
        let before = docs.len();
        docs.retain(|doc| !doomed.contains(&doc.id));
        Ok((before - docs.len()) as u64)
    }

    async fn validate_protection_level(
        &self,
        instance: InstanceId,
        partition: Partition,
    ) -> Result<bool> {
        let guard = self.state.lock().await;
        let expect_protected = partition == Partition::Protected;
        Ok(guard.instances.get(&instance).is_none_or(|state| {
            state
                .partition(partition)
                .iter()
                .all(|doc| doc.protected == expect_protected)
        }))
    }

    async fn sample_documents(
        &self,
        instance: InstanceId,
        partition: Partition,
        size: usize,
    ) -> Result<Vec<IndexedDocument>> {
        let guard = self.state.lock().await;
        let Some(state) = guard.instances.get(&instance) else {
            return Ok(Vec::new());
        };
        let mut rng = rand::rng();
        Ok(state
            .partition(partition)
            .choose_multiple(&mut rng, size)
            .cloned()
            .collect())
    }

    async fn find_by_business_keys(
        &self,
        instance: InstanceId,
        partition: Partition,
        keys: &[BusinessKey],
    ) -> Result<Vec<IndexedDocument>> {
        let guard = self.state.lock().await;
        let Some(state) = guard.instances.get(&instance) else {
            return Ok(Vec::new());
        };
        let wanted: HashSet<&BusinessKey> = keys.iter().collect();
        Ok(state
            .partition(partition)
            .iter()
            .filter(|doc| wanted.contains(&doc.business_key))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, key: &str) -> IndexedDocument {
        IndexedDocument {
            id: DocumentId(id.into()),
            business_key: key.into(),
            location: None,
            modified: Utc::now(),
            protected: false,
        }
    }

    #[tokio::test]
    async fn recreate_drops_previous_documents() {
        let index = InMemoryIndexStore::new();
        index.insert(InstanceId::ONE, Partition::Public, doc("1", "a")).await;

        index.clear_instance(InstanceId::ONE).await.unwrap();
        assert!(!index.instance_exists(InstanceId::ONE).await.unwrap());

        index
            .create_instance(InstanceId::ONE, &IndexSchema::default())
            .await
            .unwrap();
        assert_eq!(
            index
                .count_documents(InstanceId::ONE, Partition::Public)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            index.schema(InstanceId::ONE).await,
            Some(IndexSchema::default())
        );
    }

    #[tokio::test]
    async fn duplicate_scan_respects_limit() {
        let index = InMemoryIndexStore::new();
        for (id, key) in [("1", "a"), ("2", "a"), ("3", "b"), ("4", "b"), ("5", "c")] {
            index.insert(InstanceId::ZERO, Partition::Public, doc(id, key)).await;
        }

        let groups = index
            .find_duplicates(InstanceId::ZERO, Partition::Public, 1)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].business_key, "a");

        let all = index
            .find_duplicates(InstanceId::ZERO, Partition::Public, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
