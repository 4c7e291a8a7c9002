use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// How a run selects its provider cohort and which instance it writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RunMode {
    /// Rebuild the inactive instance from every eligible provider, then try
    /// to promote it.
    Full,
    /// Patch the live instance in place. Runs even when nothing new was
    /// harvested because it also removes retracted observations.
    IncrementalActiveInstance,
    /// Patch the instance not serving traffic, catching drift accumulated
    /// during a long Full rebuild.
    IncrementalInactiveInstance,
}

impl RunMode {
    pub const ALL: [RunMode; 3] = [
        RunMode::Full,
        RunMode::IncrementalActiveInstance,
        RunMode::IncrementalInactiveInstance,
    ];

    pub fn is_full(&self) -> bool {
        matches!(self, RunMode::Full)
    }

    pub fn is_incremental(&self) -> bool {
        !self.is_full()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::IncrementalActiveInstance => "incremental_active",
            RunMode::IncrementalInactiveInstance => "incremental_inactive",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full" => Ok(RunMode::Full),
            "incremental_active" | "incremental_active_instance" => {
                Ok(RunMode::IncrementalActiveInstance)
            }
            "incremental_inactive" | "incremental_inactive_instance" => {
                Ok(RunMode::IncrementalInactiveInstance)
            }
            _ => Err(ModelError::InvalidRunMode(s.to_string())),
        }
    }
}

/// Terminal result of one run, as reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "outcome", rename_all = "snake_case"))]
pub enum RunOutcome {
    Success {
        harvested: u64,
        promoted: bool,
    },
    /// Fatal; the scheduler should treat the run as failed.
    Failed { reason: String },
    /// Deliberate stop, never reported as a failure.
    Cancelled,
    /// An incremental run declined to queue behind one already in flight.
    Skipped,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }

    pub fn promoted(&self) -> bool {
        matches!(self, RunOutcome::Success { promoted: true, .. })
    }
}
