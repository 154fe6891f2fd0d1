//! Property-based checks for the tree edit primitives' non-mutation
//! invariant against randomly generated trees, complementing the concrete
//! example-based unit tests in `src/gene.rs`.

use choronzon_gene::{Gene, GeneFlags};
use proptest::prelude::*;

fn arb_kind() -> impl Strategy<Value = String> {
    "[A-Z]{1,4}"
}

fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..6)
}

fn arb_gene() -> impl Strategy<Value = Gene> {
    let leaf = (arb_kind(), arb_payload())
        .prop_map(|(kind, payload)| Gene::leaf(kind, payload, GeneFlags::structural()));
    leaf.prop_recursive(3, 16, 4, |inner| {
        (
            arb_kind(),
            arb_payload(),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(kind, payload, children)| {
                Gene::new(kind, payload, GeneFlags::structural(), children)
            })
    })
}

proptest! {
    #[test]
    fn replace_at_root_never_mutates_the_original(tree in arb_gene(), replacement in arb_gene()) {
        let before = tree.clone();
        let _ = tree.replace_at(&[], replacement);
        prop_assert_eq!(&tree, &before);
    }

    #[test]
    fn insert_at_root_never_mutates_the_original(tree in arb_gene(), child in arb_gene()) {
        let before = tree.clone();
        let count = tree.child_count();
        let index = if count == 0 { 0 } else { count };
        let _ = tree.insert_at(&[], index, child);
        prop_assert_eq!(&tree, &before);
    }

    #[test]
    fn walk_visits_every_node_exactly_once(tree in arb_gene()) {
        let visited: Vec<_> = tree.walk().collect();
        prop_assert_eq!(visited.len(), tree.node_count());
    }

    #[test]
    fn structural_equality_is_reflexive_after_a_clone(tree in arb_gene()) {
        let cloned = tree.clone();
        prop_assert_eq!(tree, cloned);
    }
}
