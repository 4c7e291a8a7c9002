//! Provider kind to harvester/processor lookup, built once per pipeline.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use harvestry_model::{Provider, ProviderKind};

use crate::error::{PipelineError, Result};

use super::harvest::Harvester;
use super::process::Processor;

/// Read-only map from provider kind to the shared services serving it.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    harvesters: HashMap<ProviderKind, Arc<dyn Harvester>>,
    processors: HashMap<ProviderKind, Arc<dyn Processor>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut harvesters: Vec<_> = self.harvesters.keys().collect();
        harvesters.sort();
        let mut processors: Vec<_> = self.processors.keys().collect();
        processors.sort();
        f.debug_struct("HandlerRegistry")
            .field("harvesters", &harvesters)
            .field("processors", &processors)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn harvester(&self, provider: &Provider) -> Result<Arc<dyn Harvester>> {
        self.harvesters.get(&provider.kind).cloned().ok_or(
            PipelineError::NotRegistered {
                stage: "harvester",
                provider: provider.id,
            },
        )
    }

    pub fn processor(&self, provider: &Provider) -> Result<Arc<dyn Processor>> {
        self.processors.get(&provider.kind).cloned().ok_or(
            PipelineError::NotRegistered {
                stage: "processor",
                provider: provider.id,
            },
        )
    }

    pub fn has_harvester(&self, kind: ProviderKind) -> bool {
        self.harvesters.contains_key(&kind)
    }

    pub fn has_processor(&self, kind: ProviderKind) -> bool {
        self.processors.contains_key(&kind)
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    inner: HandlerRegistry,
}

impl fmt::Debug for HandlerRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistryBuilder")
            .field("inner", &self.inner)
            .finish()
    }
}

impl HandlerRegistryBuilder {
    pub fn harvester(
        mut self,
        kind: ProviderKind,
        harvester: Arc<dyn Harvester>,
    ) -> Self {
        self.inner.harvesters.insert(kind, harvester);
        self
    }

    pub fn processor(
        mut self,
        kind: ProviderKind,
        processor: Arc<dyn Processor>,
    ) -> Self {
        self.inner.processors.insert(kind, processor);
        self
    }

    /// Register the same pair for every kind in `kinds`.
    pub fn serve_all(
        mut self,
        kinds: impl IntoIterator<Item = ProviderKind>,
        harvester: Arc<dyn Harvester>,
        processor: Arc<dyn Processor>,
    ) -> Self {
        for kind in kinds {
            self.inner.harvesters.insert(kind, Arc::clone(&harvester));
            self.inner.processors.insert(kind, Arc::clone(&processor));
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        self.inner
    }
}
