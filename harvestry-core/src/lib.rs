//! # Harvestry Core
//!
//! Orchestration library that harvests biodiversity observation records from
//! many providers, processes them into one of two physical index instances,
//! validates the result and flips the live instance only when every check
//! passes.
//!
//! ## Feature Flags
//!
//! - `database`: Postgres adapters for the outcome and active-instance stores
//!   (enabled by default)
//! - `demo`: synthetic harvesters and processors for driving a cycle end to
//!   end without real providers
//!
//! ## Architecture
//!
//! - [`orchestration`]: the run pipeline, coordinators, validation gate,
//!   run-mode admission and index lifecycle
//! - [`database`]: storage and reference-data ports with in-memory and
//!   Postgres implementations
//! - [`error`]: the crate error type
//!
//! ## Examples
//!
//! ```no_run
//! use harvestry_core::orchestration::{RunPipeline, RunRequest};
//! use harvestry_model::RunMode;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn nightly(pipeline: &RunPipeline) {
//!     let outcome = pipeline
//!         .run(RunRequest::new(RunMode::Full), CancellationToken::new())
//!         .await;
//!     println!("full run finished: {outcome:?}");
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Storage and reference-data boundaries
pub mod database;
/// Synthetic providers for local runs
#[cfg(feature = "demo")]
#[cfg_attr(docsrs, doc(cfg(feature = "demo")))]
pub mod demo;
/// Error types and handling
pub mod error;
/// Harvest/process/validate/promote orchestration
pub mod orchestration;

pub use error::{PipelineError, Result};
pub use harvestry_model as model;

/// Embedded schema migrations for the Postgres adapters.
#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
