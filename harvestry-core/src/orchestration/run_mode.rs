//! Admission control for the three run modes.

use std::fmt;
use std::sync::Arc;

use harvestry_model::{RunId, RunMode};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::Result;

use super::scheduler::{JobInventory, ScheduledJobKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Harvesting,
    Processing,
}

/// Phase of every lane, as published to [`RunModeStateMachine::subscribe`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStates {
    pub full: RunPhase,
    pub incremental_active: RunPhase,
    pub incremental_inactive: RunPhase,
}

impl RunStates {
    pub fn lane(&self, mode: RunMode) -> RunPhase {
        match mode {
            RunMode::Full => self.full,
            RunMode::IncrementalActiveInstance => self.incremental_active,
            RunMode::IncrementalInactiveInstance => self.incremental_inactive,
        }
    }

    fn lane_mut(&mut self, mode: RunMode) -> &mut RunPhase {
        match mode {
            RunMode::Full => &mut self.full,
            RunMode::IncrementalActiveInstance => &mut self.incremental_active,
            RunMode::IncrementalInactiveInstance => &mut self.incremental_inactive,
        }
    }
}

/// Locks guarding the lanes. Owned by whoever builds the orchestrator so
/// several pipelines in one process can share them.
#[derive(Clone, Debug, Default)]
pub struct RunLocks {
    /// Shared by both incremental modes.
    pub incremental: Arc<Mutex<()>>,
    pub full: Arc<Mutex<()>>,
}

#[derive(Debug)]
pub enum Admission {
    Admitted(RunPermit),
    /// The incremental lock was held and the mode does not queue.
    Skipped,
    /// Self-cancelled, or cancelled while waiting for the lock.
    Cancelled,
}

pub struct RunModeStateMachine {
    locks: RunLocks,
    inventory: Arc<dyn JobInventory>,
    states: Arc<watch::Sender<RunStates>>,
}

impl fmt::Debug for RunModeStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunModeStateMachine")
            .field("locks", &self.locks)
            .field("inventory", &"JobInventory")
            .field("states", &*self.states.borrow())
            .finish()
    }
}

impl RunModeStateMachine {
    pub fn new(locks: RunLocks, inventory: Arc<dyn JobInventory>) -> Self {
        let (states, _) = watch::channel(RunStates::default());
        Self {
            locks,
            inventory,
            states: Arc::new(states),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStates> {
        self.states.subscribe()
    }

    pub fn states(&self) -> RunStates {
        *self.states.borrow()
    }

    /// Decide whether a run may start.
    ///
    /// A Full run that finds another Full processing job in flight cancels
    /// `cancel` itself. IncrementalActiveInstance never waits for the
    /// incremental lock; IncrementalInactiveInstance waits until it is free or
    /// the run is cancelled.
    #[instrument(
        name = "run.admit",
        skip(self, cancel),
        fields(mode = %mode, run_id = %run_id),
        err
    )]
    pub async fn admit(
        &self,
        mode: RunMode,
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<Admission> {
        if cancel.is_cancelled() {
            return Ok(Admission::Cancelled);
        }

        let guard = match mode {
            RunMode::Full => {
                let busy = self
                    .inventory
                    .is_in_progress(ScheduledJobKind::Process(RunMode::Full), run_id)
                    .await?;
                let local = Arc::clone(&self.locks.full).try_lock_owned().ok();
                match local {
                    Some(guard) if !busy => guard,
                    _ => {
                        info!("another full run is processing; cancelling this one");
                        cancel.cancel();
                        return Ok(Admission::Cancelled);
                    }
                }
            }
            RunMode::IncrementalActiveInstance => {
                match Arc::clone(&self.locks.incremental).try_lock_owned() {
                    Ok(guard) => guard,
                    Err(_) => {
                        info!("incremental lock held; skipping run");
                        return Ok(Admission::Skipped);
                    }
                }
            }
            RunMode::IncrementalInactiveInstance => {
                let lock = Arc::clone(&self.locks.incremental);
                tokio::select! {
                    guard = lock.lock_owned() => guard,
                    _ = cancel.cancelled() => {
                        debug!("cancelled while waiting for the incremental lock");
                        return Ok(Admission::Cancelled);
                    }
                }
            }
        };

        Ok(Admission::Admitted(RunPermit {
            mode,
            run_id,
            states: Arc::clone(&self.states),
            _guard: guard,
        }))
    }
}

/// Proof of admission. Holds the lane's lock and resets the lane to
/// [`RunPhase::Idle`] when dropped.
pub struct RunPermit {
    mode: RunMode,
    run_id: RunId,
    states: Arc<watch::Sender<RunStates>>,
    _guard: OwnedMutexGuard<()>,
}

impl fmt::Debug for RunPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunPermit")
            .field("mode", &self.mode)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl RunPermit {
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn enter(&self, phase: RunPhase) {
        let mode = self.mode;
        self.states.send_modify(|states| *states.lane_mut(mode) = phase);
        debug!(mode = %mode, phase = ?phase, "lane phase changed");
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        let mode = self.mode;
        self.states
            .send_modify(|states| *states.lane_mut(mode) = RunPhase::Idle);
    }
}
