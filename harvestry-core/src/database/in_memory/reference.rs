use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use harvestry_model::{DatasetMetadata, Provider, ProviderId, Taxon, TaxonomySnapshot};
use tokio::sync::Mutex;

use crate::database::ports::{
    AreaCache, CacheCategory, ConfigurationCache, ProviderRegistry, TaxonomyCache,
};
use crate::error::{PipelineError, Result};

#[derive(Debug, Default)]
struct ProviderState {
    providers: Vec<Provider>,
    clears: usize,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryProviderRegistry {
    state: Arc<Mutex<ProviderState>>,
}

impl InMemoryProviderRegistry {
    pub fn new(providers: Vec<Provider>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                providers,
                clears: 0,
            })),
        }
    }

    pub async fn provider(&self, provider_id: ProviderId) -> Option<Provider> {
        let guard = self.state.lock().await;
        guard.providers.iter().find(|p| p.id == provider_id).cloned()
    }

    pub async fn replace(&self, providers: Vec<Provider>) {
        self.state.lock().await.providers = providers;
    }

    pub async fn clear_count(&self) -> usize {
        self.state.lock().await.clears
    }
}

#[async_trait]
impl ProviderRegistry for InMemoryProviderRegistry {
    async fn providers(&self) -> Result<Vec<Provider>> {
        Ok(self.state.lock().await.providers.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.state.lock().await.clears += 1;
        Ok(())
    }

    async fn patch_dynamic_metadata(
        &self,
        provider_id: ProviderId,
        metadata: DatasetMetadata,
    ) -> Result<()> {
        let mut guard = self.state.lock().await;
        let provider = guard
            .providers
            .iter_mut()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| {
                PipelineError::Internal(format!("unknown provider {provider_id}"))
            })?;
        provider.dynamic_metadata = Some(metadata);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TaxonomyState {
    source: Vec<Taxon>,
    cached: Option<TaxonomySnapshot>,
    refreshes: usize,
}

/// Taxonomy cache over a fixed upstream list.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTaxonomyCache {
    state: Arc<Mutex<TaxonomyState>>,
}

impl InMemoryTaxonomyCache {
    pub fn new(taxa: Vec<Taxon>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TaxonomyState {
                source: taxa,
                cached: None,
                refreshes: 0,
            })),
        }
    }

    pub async fn refresh_count(&self) -> usize {
        self.state.lock().await.refreshes
    }
}

#[async_trait]
impl TaxonomyCache for InMemoryTaxonomyCache {
    async fn refresh(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        guard.refreshes += 1;
        guard.cached = Some(TaxonomySnapshot::new(guard.source.clone()));
        Ok(())
    }

    async fn snapshot(&self) -> Result<TaxonomySnapshot> {
        let mut guard = self.state.lock().await;
        if let Some(cached) = &guard.cached {
            return Ok(cached.clone());
        }
        let snapshot = TaxonomySnapshot::new(guard.source.clone());
        guard.cached = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn clear(&self) -> Result<()> {
        self.state.lock().await.cached = None;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryAreaCache {
    loads: Arc<Mutex<usize>>,
}

impl InMemoryAreaCache {
    /// Number of times geometries were actually loaded.
    pub async fn load_count(&self) -> usize {
        *self.loads.lock().await
    }
}

#[async_trait]
impl AreaCache for InMemoryAreaCache {
    async fn initialize(&self) -> Result<()> {
        let mut loads = self.loads.lock().await;
        if *loads == 0 {
            *loads = 1;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryConfigurationCache {
    cleared: Arc<Mutex<HashMap<CacheCategory, usize>>>,
}

impl InMemoryConfigurationCache {
    pub async fn clear_count(&self, category: CacheCategory) -> usize {
        self.cleared
            .lock()
            .await
            .get(&category)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConfigurationCache for InMemoryConfigurationCache {
    async fn clear(&self, category: CacheCategory) -> Result<()> {
        *self.cleared.lock().await.entry(category).or_default() += 1;
        Ok(())
    }
}
