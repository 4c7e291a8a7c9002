//! Layered configuration: `harvestry.toml`, `.env` and process environment.

pub mod error;
pub mod loader;
pub mod sources;
pub mod validation;

pub use error::ConfigLoadError;
pub use loader::{
    Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigMetadata, DatabaseConfig,
};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings, apply_guard_rails};
