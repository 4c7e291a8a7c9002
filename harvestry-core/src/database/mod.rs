//! Storage and reference-data boundaries consumed by the orchestrator, with
//! in-memory and Postgres implementations.

pub mod in_memory;
pub mod ports;
#[cfg(feature = "database")]
#[cfg_attr(docsrs, doc(cfg(feature = "database")))]
pub mod postgres;

pub use ports::*;
