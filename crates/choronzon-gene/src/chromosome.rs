//! Chromosome: a root gene plus the evolutionary metadata the scheduler and
//! corpus need to track a candidate across its lifetime.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Gene;

/// Content-addressed chromosome identifier: the hex-encoded SHA-256 of the
/// chromosome's serialized bytes and generation number. Stable across
/// resumed runs without needing a monotonic counter in checkpointed state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChromosomeId(String);

impl ChromosomeId {
    /// Derives an identifier from serialized bytes and a generation number.
    pub fn from_bytes(serialized: &[u8], generation: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(generation.to_le_bytes());
        hasher.update(serialized);
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the identifier's string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuilds an identifier from a hex string previously returned by
    /// [`ChromosomeId::as_str`], e.g. when reloading a checkpoint's
    /// `index.json` where recomputing from bytes would require bytes that
    /// are not at hand (a parent's serialized form, for instance).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl std::fmt::Display for ChromosomeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A candidate input: a gene tree plus the lineage and scoring metadata
/// the scheduler and corpus operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chromosome {
    /// The root gene of this chromosome's tree.
    pub root: Gene,
    /// Content-addressed identifier.
    pub id: ChromosomeId,
    /// Identifiers of the chromosome(s) this one was derived from.
    pub parent_ids: Vec<ChromosomeId>,
    /// Generation number (0 for seeds).
    pub generation: u64,
    /// Names of the variation operators applied to produce this chromosome,
    /// oldest first; empty for seeds deserialized directly from a file.
    pub operator_chain: Vec<String>,
    /// Last-known fitness score, if this chromosome has been evaluated.
    pub fitness: Option<f64>,
    /// Whether this chromosome has been executed under the tracer.
    pub executed: bool,
}

impl Chromosome {
    /// Constructs a chromosome for a seed deserialized directly from a file.
    pub fn seed(root: Gene, id: ChromosomeId) -> Self {
        Self {
            root,
            id,
            parent_ids: Vec::new(),
            generation: 0,
            operator_chain: Vec::new(),
            fitness: None,
            executed: false,
        }
    }

    /// Constructs a chromosome produced by a variation operator from one or
    /// two parents.
    pub fn child(
        root: Gene,
        id: ChromosomeId,
        parent_ids: Vec<ChromosomeId>,
        parent_generation: u64,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            root,
            id,
            parent_ids,
            generation: parent_generation + 1,
            operator_chain: vec![operator.into()],
            fitness: None,
            executed: false,
        }
    }

    /// Records that this chromosome achieved `fitness` under execution.
    pub fn mark_executed(&mut self, fitness: f64) {
        self.executed = true;
        self.fitness = Some(fitness);
    }
}
