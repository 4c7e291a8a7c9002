//! Process-local adapters for every port. Used by the demo and the test
//! suites, and fine for single-node dry runs.

mod index;
mod instance;
mod outcomes;
mod reference;

pub use index::InMemoryIndexStore;
pub use instance::InMemoryActiveInstanceStore;
pub use outcomes::InMemoryOutcomeStore;
pub use reference::{
    InMemoryAreaCache, InMemoryConfigurationCache, InMemoryProviderRegistry,
    InMemoryTaxonomyCache,
};
