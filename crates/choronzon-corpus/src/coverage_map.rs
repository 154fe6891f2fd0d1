//! The global coverage map `G` and the per-trial fitness formula:
//! `fitness(C) = Σ_{e ∈ C} 1 / (1 + G[e])`.

use std::collections::BTreeMap;

use choronzon_coverage::CoverageSet;
use serde::{Deserialize, Serialize};

/// Running hit counts for every basic-block edge observed across the
/// campaign so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalCoverageMap {
    counts: BTreeMap<(u64, u64), u64>,
}

impl GlobalCoverageMap {
    /// An empty map (start of a fresh campaign).
    pub fn new() -> Self {
        Self::default()
    }

    /// Current hit count for `edge` (`0` if never observed).
    pub fn count(&self, edge: (u64, u64)) -> u64 {
        self.counts.get(&edge).copied().unwrap_or(0)
    }

    /// Increments the count for `edge` by one.
    pub fn record(&mut self, edge: (u64, u64)) {
        *self.counts.entry(edge).or_insert(0) += 1;
    }

    /// Total number of distinct edges observed so far.
    pub fn edge_count(&self) -> usize {
        self.counts.len()
    }
}

/// Computes `fitness(C)` against the map's state *before* any update from
/// this trial (callers must score before calling
/// [`GlobalCoverageMap::record`] for every edge in `coverage`).
pub fn fitness(coverage: &CoverageSet, global: &GlobalCoverageMap) -> f64 {
    coverage
        .iter()
        .map(|hit| 1.0 / (1.0 + global.count((hit.image_index, hit.bbl)) as f64))
        .sum()
}

/// Whether `coverage` contains at least one edge the map has never seen.
pub fn has_novel_edge(coverage: &CoverageSet, global: &GlobalCoverageMap) -> bool {
    coverage
        .iter()
        .any(|hit| global.count((hit.image_index, hit.bbl)) == 0)
}
