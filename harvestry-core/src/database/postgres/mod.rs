//! Postgres adapters for the durable pipeline state. Schema lives in
//! `migrations/` and is applied through [`crate::MIGRATOR`].

mod instance;
mod outcomes;

pub use instance::PostgresActiveInstanceStore;
pub use outcomes::PostgresOutcomeStore;
