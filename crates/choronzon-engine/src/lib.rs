#![deny(missing_docs)]
//! The fuzzing engine: run configuration, seed ingestion, target spawning,
//! checkpoint persistence, the run manifest, and the generation scheduler
//! that ties them together.

pub mod config;
pub mod manifest;
pub mod persistence;
pub mod scheduler;
pub mod seeds;
pub mod spawn;

pub use config::{OutputConfig, RunConfig, SeedConfig, TargetConfig};
pub use manifest::RunManifest;
pub use scheduler::{Scheduler, StopReason, TrialOutcome};
pub use spawn::{ProcessExecutor, TrialExecutor};
