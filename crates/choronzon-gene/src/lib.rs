#![deny(missing_docs)]
//! The gene/chromosome data model: an arena-backed tree of structurally
//! typed nodes describing a file format, plus the evolutionary metadata
//! attached to each candidate.

mod admissibility;
mod chromosome;
/// Error types for gene-tree edit primitives.
pub mod error;
mod gene;

pub use admissibility::AdmissibilityOracle;
pub use chromosome::{Chromosome, ChromosomeId};
pub use error::GeneError;
pub use gene::{Gene, GeneFlags, GeneKind, NodeRef, Path, Walk};
