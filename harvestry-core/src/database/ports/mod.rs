pub mod index;
pub mod instance;
pub mod outcomes;
pub mod reference;

pub use index::IndexStore;
pub use instance::ActiveInstanceStore;
pub use outcomes::OutcomeStore;
pub use reference::{
    AreaCache, CacheCategory, ConfigurationCache, ProviderRegistry, TaxonomyCache,
};
