//! Weighted operator selection: per-family weights round-trip through
//! checkpoints so a resumed run doesn't silently reset its
//! exploration/exploitation balance.

use std::collections::BTreeMap;

use choronzon_core::RngHandle;
use serde::{Deserialize, Serialize};

/// Multiplicative reward/penalty factor applied on each admission or
/// serialization failure.
pub const ALPHA: f64 = 0.1;
/// Minimum weight any operator is allowed to fall to.
pub const WEIGHT_FLOOR: f64 = 0.01;

/// The two operator families the scheduler alternates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Single-parent byte-level operators.
    Mutator,
    /// Tree-structural operators.
    Recombinator,
}

/// Per-operator weights for both families, uniform within a family until
/// updated by admitted or rejected trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorWeights {
    mutators: BTreeMap<String, f64>,
    recombinators: BTreeMap<String, f64>,
}

impl OperatorWeights {
    /// Builds uniform initial weights from the given operator name lists.
    pub fn uniform(mutator_names: &[&str], recombinator_names: &[&str]) -> Self {
        Self {
            mutators: uniform_map(mutator_names),
            recombinators: uniform_map(recombinator_names),
        }
    }

    fn family_map(&self, family: Family) -> &BTreeMap<String, f64> {
        match family {
            Family::Mutator => &self.mutators,
            Family::Recombinator => &self.recombinators,
        }
    }

    fn family_map_mut(&mut self, family: Family) -> &mut BTreeMap<String, f64> {
        match family {
            Family::Mutator => &mut self.mutators,
            Family::Recombinator => &mut self.recombinators,
        }
    }

    /// Picks an operator name from `family` by current weight.
    pub fn select(&self, family: Family, rng: &mut RngHandle) -> Option<String> {
        let map = self.family_map(family);
        if map.is_empty() {
            return None;
        }
        let total: f64 = map.values().sum();
        let mut draw = rng.next_unit() * total;
        for (name, weight) in map {
            if draw < *weight {
                return Some(name.clone());
            }
            draw -= weight;
        }
        map.keys().last().cloned()
    }

    /// Rewards `name` for producing an admitted child: weight ×= (1 + α),
    /// then the family is renormalized.
    pub fn reward(&mut self, family: Family, name: &str) {
        self.adjust(family, name, 1.0 + ALPHA);
    }

    /// Penalizes `name` for a serialization failure: weight ×= (1 - α),
    /// floored, then the family is renormalized.
    pub fn penalize(&mut self, family: Family, name: &str) {
        self.adjust(family, name, 1.0 - ALPHA);
    }

    fn adjust(&mut self, family: Family, name: &str, factor: f64) {
        let map = self.family_map_mut(family);
        if let Some(weight) = map.get_mut(name) {
            *weight = (*weight * factor).max(WEIGHT_FLOOR);
        }
        renormalize(map);
    }
}

fn uniform_map(names: &[&str]) -> BTreeMap<String, f64> {
    if names.is_empty() {
        return BTreeMap::new();
    }
    let weight = 1.0 / names.len() as f64;
    names.iter().map(|name| (name.to_string(), weight)).collect()
}

fn renormalize(map: &mut BTreeMap<String, f64>) {
    let total: f64 = map.values().sum();
    if total <= 0.0 {
        return;
    }
    for weight in map.values_mut() {
        *weight /= total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_increases_relative_weight_and_stays_normalized() {
        let mut weights = OperatorWeights::uniform(&["a", "b"], &[]);
        weights.reward(Family::Mutator, "a");
        let total: f64 = weights.mutators.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(weights.mutators["a"] > weights.mutators["b"]);
    }

    #[test]
    fn penalty_never_drops_below_floor() {
        let mut weights = OperatorWeights::uniform(&["a", "b"], &[]);
        for _ in 0..200 {
            weights.penalize(Family::Mutator, "a");
        }
        assert!(weights.mutators["a"] >= WEIGHT_FLOOR - 1e-12);
    }

    #[test]
    fn select_returns_none_for_empty_family() {
        let weights = OperatorWeights::uniform(&[], &[]);
        let mut rng = RngHandle::from_seed(1);
        assert_eq!(weights.select(Family::Recombinator, &mut rng), None);
    }
}
