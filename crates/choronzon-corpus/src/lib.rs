#![deny(missing_docs)]
//! Fitness scoring, the global coverage map, and the bounded corpus with
//! its admission and eviction policy.

mod corpus;
mod coverage_map;

pub use corpus::{Corpus, CorpusMember};
pub use coverage_map::{fitness, has_novel_edge, GlobalCoverageMap};
