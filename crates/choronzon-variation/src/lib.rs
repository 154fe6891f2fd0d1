#![deny(missing_docs)]
//! Mutation and recombination operators that transform gene trees, plus
//! the weighted operator-selection policy the scheduler uses to pick
//! among them.

pub mod mutators;
pub mod recombinators;
pub mod weights;

pub use mutators::VariationOutcome;
pub use weights::{Family, OperatorWeights, ALPHA, WEIGHT_FLOOR};

/// Stable names of every mutator, in catalogue order.
pub const MUTATOR_NAMES: [&str; 9] = [
    "bit_flip",
    "byte_flip",
    "byte_set_high_bit",
    "byte_clear_high_bit",
    "random_byte",
    "byte_swap",
    "byte_insert",
    "byte_delete",
    "boundary_value",
];

/// Stable names of every recombinator, in catalogue order.
pub const RECOMBINATOR_NAMES: [&str; 6] = [
    "gene_swap",
    "gene_duplicate",
    "gene_remove",
    "gene_shuffle",
    "cross_over",
    "gene_splice",
];

/// Applies a mutator by name to a single parent tree. `budget` is used by
/// the variable-count mutators (`bit_flip`, `byte_flip`, `byte_insert`,
/// `byte_delete`); fixed-arity mutators ignore it.
pub fn apply_mutator(
    name: &str,
    parent: &choronzon_gene::Gene,
    budget: usize,
    rng: &mut choronzon_core::RngHandle,
) -> Option<VariationOutcome> {
    match name {
        "bit_flip" => Some(mutators::bit_flip(parent, budget, rng)),
        "byte_flip" => Some(mutators::byte_flip(parent, budget, rng)),
        "byte_set_high_bit" => Some(mutators::byte_set_high_bit(parent, rng)),
        "byte_clear_high_bit" => Some(mutators::byte_clear_high_bit(parent, rng)),
        "random_byte" => Some(mutators::random_byte(parent, rng)),
        "byte_swap" => Some(mutators::byte_swap(parent, rng)),
        "byte_insert" => Some(mutators::byte_insert(parent, budget, rng)),
        "byte_delete" => Some(mutators::byte_delete(parent, budget, rng)),
        "boundary_value" => Some(mutators::boundary_value(parent, rng)),
        _ => None,
    }
}

/// Applies a recombinator by name. Two-parent operators (`cross_over`,
/// `gene_splice`) require `secondary`; single-parent operators ignore it.
pub fn apply_recombinator(
    name: &str,
    primary: &choronzon_gene::Gene,
    secondary: Option<&choronzon_gene::Gene>,
    oracle: &dyn choronzon_gene::AdmissibilityOracle,
    rng: &mut choronzon_core::RngHandle,
) -> Option<VariationOutcome> {
    match name {
        "gene_swap" => Some(recombinators::gene_swap(primary, rng)),
        "gene_duplicate" => Some(recombinators::gene_duplicate(primary, oracle, rng)),
        "gene_remove" => Some(recombinators::gene_remove(primary, rng)),
        "gene_shuffle" => Some(recombinators::gene_shuffle(primary, rng)),
        "cross_over" => Some(recombinators::cross_over(primary, secondary?, oracle, rng)),
        "gene_splice" => Some(recombinators::gene_splice(primary, secondary?, oracle, rng)),
        _ => None,
    }
}
