use std::fmt;

use async_trait::async_trait;
use harvestry_model::{DatasetMetadata, Provider, ProviderId, TaxonomySnapshot};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Source of the configured providers.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    async fn providers(&self) -> Result<Vec<Provider>>;

    /// Drop cached provider rows so the next read is fresh.
    async fn clear(&self) -> Result<()>;

    async fn patch_dynamic_metadata(
        &self,
        provider_id: ProviderId,
        metadata: DatasetMetadata,
    ) -> Result<()>;
}

#[async_trait]
pub trait TaxonomyCache: Send + Sync {
    /// Rebuild the taxonomy from its upstream source.
    async fn refresh(&self) -> Result<()>;

    async fn snapshot(&self) -> Result<TaxonomySnapshot>;

    async fn clear(&self) -> Result<()>;
}

#[async_trait]
pub trait AreaCache: Send + Sync {
    /// Load area geometries. Calling it again is a no-op.
    async fn initialize(&self) -> Result<()>;
}

/// Groups of cached configuration consumers read on their query paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    ProcessedConfiguration,
    RunSnapshots,
    DataProviders,
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheCategory::ProcessedConfiguration => "processed_configuration",
            CacheCategory::RunSnapshots => "run_snapshots",
            CacheCategory::DataProviders => "data_providers",
        })
    }
}

#[async_trait]
pub trait ConfigurationCache: Send + Sync {
    async fn clear(&self, category: CacheCategory) -> Result<()>;
}
