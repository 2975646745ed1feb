//! In-process adapters for the domain ports.
//!
//! - `memory_repo`: a mutex-guarded store for local runs without a database.
//! - `recording_repo`: a stub that captures calls and returns a preset outcome.

pub mod memory_repo;
pub mod recording_repo;
