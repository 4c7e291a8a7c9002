use std::sync::Arc;

use async_trait::async_trait;
use harvestry_model::InstanceId;
use tokio::sync::Mutex;

use crate::database::ports::ActiveInstanceStore;
use crate::error::Result;

#[derive(Debug)]
struct ActiveState {
    active: InstanceId,
    flips: Vec<InstanceId>,
}

/// Active flag held in memory, with a log of every successful flip.
#[derive(Clone, Debug)]
pub struct InMemoryActiveInstanceStore {
    state: Arc<Mutex<ActiveState>>,
}

impl Default for InMemoryActiveInstanceStore {
    fn default() -> Self {
        Self::new(InstanceId::ZERO)
    }
}

impl InMemoryActiveInstanceStore {
    pub fn new(active: InstanceId) -> Self {
        Self {
            state: Arc::new(Mutex::new(ActiveState {
                active,
                flips: Vec::new(),
            })),
        }
    }

    /// Instances made active, oldest first.
    pub async fn flips(&self) -> Vec<InstanceId> {
        self.state.lock().await.flips.clone()
    }
}

#[async_trait]
impl ActiveInstanceStore for InMemoryActiveInstanceStore {
    async fn active(&self) -> Result<InstanceId> {
        Ok(self.state.lock().await.active)
    }

    async fn compare_and_set(
        &self,
        expected: InstanceId,
        next: InstanceId,
    ) -> Result<bool> {
        let mut guard = self.state.lock().await;
        if guard.active != expected {
            return Ok(false);
        }
        guard.active = next;
        guard.flips.push(next);
        Ok(true)
    }
}
