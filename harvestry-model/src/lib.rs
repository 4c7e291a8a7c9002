//! Core data model definitions shared across Harvestry crates.
#![allow(missing_docs)]

pub mod document;
pub mod error;
pub mod ids;
pub mod instance;
pub mod outcome;
pub mod provider;
pub mod run_mode;
pub mod snapshot;
pub mod taxonomy;

pub use document::{
    BusinessKey, ClusterHealth, Coordinates, DocumentId, DuplicateGroup,
    IndexedDocument,
};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{ProviderId, RunId};
pub use instance::{InstanceId, Partition};
pub use outcome::{HarvestOutcome, OutcomeStatus, ProcessOutcome};
pub use provider::{DatasetMetadata, Provider, ProviderCapabilities, ProviderKind};
pub use run_mode::{RunMode, RunOutcome};
pub use snapshot::{ProviderRunStats, RunSnapshot, RunStatistics};
pub use taxonomy::{Taxon, TaxonId, TaxonomySnapshot};
