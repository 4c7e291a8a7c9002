pub mod config;
pub mod harvest;
pub mod lifecycle;
pub mod pipeline;
pub mod post_process;
pub mod process;
pub mod registry;
pub mod retry;
pub mod run_mode;
pub mod scheduler;
pub mod validation;

pub use config::{
    HarvestConfig, IndexSchema, PipelineConfig, ProcessConfig, RetryConfig,
    TrailingIncremental, ValidationConfig,
};
pub use harvest::{HarvestCoordinator, HarvestResult, HarvestStrategy, Harvester};
pub use lifecycle::IndexLifecycleManager;
pub use pipeline::{
    PipelineLocks, PipelinePorts, PreHarvestStep, RefreshProviderCache, RunContext,
    RunPipeline, RunPipelineBuilder, RunRequest,
};
pub use post_process::{
    AwaitDocumentCounts, PostProcessContext, PostProcessStep, RemoveDuplicates,
    TrailingIncrementalStep, ValidateAndPromote,
};
pub use process::{ProcessCoordinator, ProcessPorts, ProcessResult, Processor};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use retry::retry_transient;
pub use run_mode::{Admission, RunLocks, RunModeStateMachine, RunPermit, RunPhase, RunStates};
pub use scheduler::{
    ChannelFollowUpScheduler, FollowUpJob, FollowUpScheduler, InMemoryJobInventory,
    JobInventory, ScheduledJobKind,
};
pub use validation::{CheckVerdict, ValidationCheck, ValidationGate, ValidationReport};
