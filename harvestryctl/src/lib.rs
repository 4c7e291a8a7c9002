//! Operator tooling for Harvestry.
//!
//! Resolves layered configuration (`harvestry.toml`, `.env`, environment),
//! inspects pipeline state kept in Postgres and drives demo publish cycles
//! over the in-memory adapters of `harvestry-core`.
#![allow(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
