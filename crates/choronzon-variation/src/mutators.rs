//! Single-parent, byte-level mutators.
//!
//! Each mutator picks one payload-bearing node uniformly at random and
//! edits its bytes. An operator that finds no payload to work with (e.g.
//! an all-empty-leaf tree) returns the parent unchanged with `no_op: true`;
//! callers must record that as provenance rather than treat it as failure.

use choronzon_core::RngHandle;
use choronzon_gene::{Gene, Path};

/// Outcome of applying a mutator (or recombinator) to one or two parents.
#[derive(Debug, Clone)]
pub struct VariationOutcome {
    /// The resulting tree: a genuine child, or the first parent unchanged.
    pub tree: Gene,
    /// True if no admissible edit was found and `tree` equals the parent.
    pub no_op: bool,
}

impl VariationOutcome {
    fn child(tree: Gene) -> Self {
        Self { tree, no_op: false }
    }

    fn unchanged(parent: &Gene) -> Self {
        Self {
            tree: parent.clone(),
            no_op: true,
        }
    }
}

/// Boundary constants a `boundary_value` edit may write, truncated to the
/// chosen window width's low-order bytes.
const BOUNDARY_VALUES: [i64; 11] = [
    0,
    1,
    -1,
    i8::MAX as i64,
    i8::MIN as i64,
    0x7F,
    -0x80,
    0xFF,
    0xFFFF,
    0x7FFF_FFFF,
    -0x8000_0000,
];

fn payload_paths(parent: &Gene) -> Vec<Path> {
    parent
        .walk()
        .filter(|(_, node)| !node.payload.is_empty())
        .map(|(path, _)| path)
        .collect()
}

fn pick_payload_path(parent: &Gene, rng: &mut RngHandle) -> Option<Path> {
    let candidates = payload_paths(parent);
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.below(candidates.len())].clone())
}

/// Replaces the payload at `path` with the result of `edit`, leaving the
/// node's kind, flags, and children untouched.
fn edit_payload_at(
    parent: &Gene,
    path: &Path,
    edit: impl FnOnce(&mut Vec<u8>, &mut RngHandle),
    rng: &mut RngHandle,
) -> VariationOutcome {
    let target = match parent.get(path) {
        Ok(node) => node,
        Err(_) => return VariationOutcome::unchanged(parent),
    };
    let (kind, mut payload, flags, children) = target.into_parts();
    edit(&mut payload, rng);
    let replacement = Gene::new(kind, payload, flags, children);
    match parent.replace_at(path, replacement) {
        Ok(tree) => VariationOutcome::child(tree),
        Err(_) => VariationOutcome::unchanged(parent),
    }
}

/// Clamps a byte-count budget to a sensible fraction of `payload_len`.
fn budget(payload_len: usize, requested: usize) -> usize {
    let cap = (payload_len / 4).max(1).min(payload_len);
    requested.min(cap).max(1)
}

/// Flips `n` random bits across one randomly chosen non-empty payload.
pub fn bit_flip(parent: &Gene, n: usize, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            let bits = budget(payload.len() * 8, n.max(1));
            for _ in 0..bits {
                let bit_index = rng.below(payload.len() * 8);
                payload[bit_index / 8] ^= 1 << (bit_index % 8);
            }
        },
        rng,
    )
}

/// XORs `n` random bytes with random nonzero masks.
pub fn byte_flip(parent: &Gene, n: usize, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            let count = budget(payload.len(), n.max(1));
            for _ in 0..count {
                let idx = rng.below(payload.len());
                let mask = 1 + rng.below(255) as u8;
                payload[idx] ^= mask;
            }
        },
        rng,
    )
}

/// Sets the high bit of one randomly chosen byte.
pub fn byte_set_high_bit(parent: &Gene, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            let idx = rng.below(payload.len());
            payload[idx] |= 0x80;
        },
        rng,
    )
}

/// Clears the high bit of one randomly chosen byte.
pub fn byte_clear_high_bit(parent: &Gene, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            let idx = rng.below(payload.len());
            payload[idx] &= !0x80;
        },
        rng,
    )
}

/// Overwrites one byte with a uniformly random value.
pub fn random_byte(parent: &Gene, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            let idx = rng.below(payload.len());
            payload[idx] = rng.below(256) as u8;
        },
        rng,
    )
}

/// Swaps two random byte positions within one payload.
pub fn byte_swap(parent: &Gene, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            if payload.len() < 2 {
                return;
            }
            let a = rng.below(payload.len());
            let mut b = rng.below(payload.len());
            if b == a {
                b = (b + 1) % payload.len();
            }
            payload.swap(a, b);
        },
        rng,
    )
}

/// Inserts `k` random bytes at a random position.
pub fn byte_insert(parent: &Gene, k: usize, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            let count = k.max(1).min(64);
            let at = rng.below(payload.len() + 1);
            let insertion: Vec<u8> = (0..count).map(|_| rng.below(256) as u8).collect();
            payload.splice(at..at, insertion);
        },
        rng,
    )
}

/// Removes `k` consecutive bytes at a random position. Never empties a
/// payload entirely, since an empty payload is indistinguishable from "no
/// payload" for purposes of later mutator selection.
pub fn byte_delete(parent: &Gene, k: usize, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            if payload.len() <= 1 {
                return;
            }
            let max_removable = payload.len() - 1;
            let count = k.max(1).min(max_removable);
            let at = rng.below(payload.len() - count + 1);
            payload.drain(at..at + count);
        },
        rng,
    )
}

/// Overwrites a 1/2/4/8-byte aligned window with a boundary value.
pub fn boundary_value(parent: &Gene, rng: &mut RngHandle) -> VariationOutcome {
    let path = match pick_payload_path(parent, rng) {
        Some(p) => p,
        None => return VariationOutcome::unchanged(parent),
    };
    edit_payload_at(
        parent,
        &path,
        |payload, rng| {
            let widths: Vec<usize> = [1usize, 2, 4, 8]
                .into_iter()
                .filter(|w| *w <= payload.len())
                .collect();
            if widths.is_empty() {
                return;
            }
            let width = widths[rng.below(widths.len())];
            let aligned_slots = payload.len() / width;
            let slot = rng.below(aligned_slots.max(1));
            let at = slot * width;
            let value = BOUNDARY_VALUES[rng.below(BOUNDARY_VALUES.len())];
            let bytes = value.to_le_bytes();
            payload[at..at + width].copy_from_slice(&bytes[..width]);
        },
        rng,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use choronzon_gene::GeneFlags;

    fn payload_gene(bytes: &[u8]) -> Gene {
        Gene::leaf("LEAF", bytes.to_vec(), GeneFlags::structural())
    }

    #[test]
    fn bit_flip_changes_exactly_flagged_bits() {
        let gene = payload_gene(&[0u8; 4]);
        let mut rng = RngHandle::from_seed(1);
        let out = bit_flip(&gene, 3, &mut rng);
        assert!(!out.no_op);
        assert_ne!(out.tree.payload(), gene.payload());
    }

    #[test]
    fn byte_insert_grows_payload() {
        let gene = payload_gene(&[1, 2, 3]);
        let mut rng = RngHandle::from_seed(2);
        let out = byte_insert(&gene, 4, &mut rng);
        assert_eq!(out.tree.payload().len(), 7);
    }

    #[test]
    fn byte_delete_never_empties_payload() {
        let gene = payload_gene(&[1, 2]);
        let mut rng = RngHandle::from_seed(3);
        let out = byte_delete(&gene, 10, &mut rng);
        assert!(!out.tree.payload().is_empty());
    }

    #[test]
    fn no_op_on_all_empty_payloads() {
        let gene = Gene::leaf("LEAF", Vec::new(), GeneFlags::structural());
        let mut rng = RngHandle::from_seed(4);
        let out = random_byte(&gene, &mut rng);
        assert!(out.no_op);
        assert_eq!(out.tree, gene);
    }

    #[test]
    fn boundary_value_writes_aligned_window() {
        let gene = payload_gene(&[0xAA; 8]);
        let mut rng = RngHandle::from_seed(5);
        let out = boundary_value(&gene, &mut rng);
        assert!(!out.no_op);
    }
}
