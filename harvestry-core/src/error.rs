use harvestry_model::{InstanceId, ModelError, ProviderId, RunMode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Storage timeout: {0}")]
    Timeout(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Provider {provider} failed: {message}")]
    Provider {
        provider: ProviderId,
        message: String,
    },

    #[error("No {stage} implementation registered for provider {provider}")]
    NotRegistered {
        stage: &'static str,
        provider: ProviderId,
    },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Index instance {instance} rejected: {}", reasons.join("; "))]
    ValidationRejected {
        instance: InstanceId,
        reasons: Vec<String>,
    },

    #[error("Cannot promote instance {requested}: instance {active} is already active")]
    PromotionConflict {
        requested: InstanceId,
        active: InstanceId,
    },

    #[error("{mode} run stage '{stage}' failed: {message}")]
    Stage {
        mode: RunMode,
        stage: &'static str,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }

    /// Errors worth retrying against the storage backends.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Timeout(_) | PipelineError::Unavailable(_) => true,
            #[cfg(feature = "database")]
            PipelineError::Database(err) => {
                matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
            _ => false,
        }
    }

    pub fn stage(mode: RunMode, stage: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::Stage {
            mode,
            stage,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
