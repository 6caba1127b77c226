//! Concrete artifact implementations.
//!
//! The orchestrator core only knows the traits in [`crate::domain`]; this
//! module provides the built-in process-backed implementation used by the
//! CLI.

pub mod process;

pub use process::{ProcessArtifact, ProcessArtifactFactory};
