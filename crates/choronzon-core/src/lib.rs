#![deny(missing_docs)]
//! Shared error types, deterministic RNG plumbing, and schema versioning
//! used across every choronzon crate.

pub mod errors;
pub mod rng;
pub mod schema;

pub use errors::{ChoronzonError, ErrorInfo};
pub use rng::{derive_substream_seed, PrngState, RngHandle};
pub use schema::SchemaVersion;
