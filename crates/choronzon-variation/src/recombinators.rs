//! Tree-structural recombinators.
//!
//! These act on `structural`-flagged children only, and every edit is
//! checked against an [`AdmissibilityOracle`] before being applied so the
//! result never leaves the plug-in's declared grammar. An operator that
//! cannot find an admissible edit returns the first parent unchanged with
//! `no_op: true`.

use choronzon_core::RngHandle;
use choronzon_gene::{AdmissibilityOracle, Gene, Path};

use crate::mutators::VariationOutcome;

/// Number of random candidate positions `cross_over`/`gene_splice` try
/// before giving up and reporting a no-op.
const ADMISSIBILITY_ATTEMPTS: usize = 16;

fn unchanged(parent: &Gene) -> VariationOutcome {
    VariationOutcome {
        tree: parent.clone(),
        no_op: true,
    }
}

fn child(tree: Gene) -> VariationOutcome {
    VariationOutcome { tree, no_op: false }
}

/// Collects the paths of every `structural` node in the tree, root excluded
/// (the root has no parent slot to be reordered, duplicated, or removed
/// within).
fn structural_paths(gene: &Gene) -> Vec<Path> {
    let mut out = Vec::new();
    collect(gene, &mut Vec::new(), &mut out);
    out
}

fn collect(gene: &Gene, prefix: &mut Path, out: &mut Vec<Path>) {
    for (index, child) in gene.children().into_iter().enumerate() {
        prefix.push(index);
        if child.flags().structural {
            out.push(prefix.clone());
        }
        collect(&child, prefix, out);
        prefix.pop();
    }
}

/// Paths of nodes with at least `min_children` structural direct children.
fn nodes_with_structural_children(gene: &Gene, min_children: usize) -> Vec<Path> {
    let mut out = Vec::new();
    collect_parents(gene, &mut Vec::new(), min_children, &mut out);
    out
}

fn collect_parents(gene: &Gene, prefix: &mut Path, min_children: usize, out: &mut Vec<Path>) {
    let structural_count = gene
        .children()
        .iter()
        .filter(|c| c.flags().structural)
        .count();
    if structural_count >= min_children {
        out.push(prefix.clone());
    }
    for (index, child) in gene.children().into_iter().enumerate() {
        prefix.push(index);
        collect_parents(&child, prefix, min_children, out);
        prefix.pop();
    }
}

fn structural_child_indices(node: &Gene) -> Vec<usize> {
    node.children()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.flags().structural)
        .map(|(i, _)| i)
        .collect()
}

/// Paths of `structural` nodes whose subtree contains no `essential` gene —
/// the set of subtrees that may be removed outright (by deletion, or by
/// replacement, which discards the existing subtree just the same)
/// without losing a gene a serializer relies on being present.
fn removable_structural_paths(gene: &Gene) -> Vec<Path> {
    structural_paths(gene)
        .into_iter()
        .filter(|path| {
            gene.get(path)
                .map(|subtree| subtree.walk().all(|(_, node)| !node.flags.essential))
                .unwrap_or(false)
        })
        .collect()
}

/// Exchanges two random `structural` children sharing a parent.
pub fn gene_swap(parent: &Gene, rng: &mut RngHandle) -> VariationOutcome {
    let parents = nodes_with_structural_children(parent, 2);
    if parents.is_empty() {
        return unchanged(parent);
    }
    let parent_path = parents[rng.below(parents.len())].clone();
    let node = match parent.get(&parent_path) {
        Ok(n) => n,
        Err(_) => return unchanged(parent),
    };
    let indices = structural_child_indices(&node);
    if indices.len() < 2 {
        return unchanged(parent);
    }
    let a = indices[rng.below(indices.len())];
    let mut b = indices[rng.below(indices.len())];
    if b == a {
        b = indices[(indices.iter().position(|&x| x == a).unwrap() + 1) % indices.len()];
    }
    let mut path_a = parent_path.clone();
    path_a.push(a);
    let mut path_b = parent_path;
    path_b.push(b);
    match parent.swap(&path_a, &path_b) {
        Ok(tree) => child(tree),
        Err(_) => unchanged(parent),
    }
}

/// Appends a clone of a random `structural` child to its own parent node,
/// if the plug-in's admissibility rule allows another copy at that
/// position.
pub fn gene_duplicate(
    parent: &Gene,
    oracle: &dyn AdmissibilityOracle,
    rng: &mut RngHandle,
) -> VariationOutcome {
    let parents = nodes_with_structural_children(parent, 1);
    if parents.is_empty() {
        return unchanged(parent);
    }
    let parent_path = parents[rng.below(parents.len())].clone();
    let node = match parent.get(&parent_path) {
        Ok(n) => n,
        Err(_) => return unchanged(parent),
    };
    let indices = structural_child_indices(&node);
    if indices.is_empty() {
        return unchanged(parent);
    }
    let chosen = indices[rng.below(indices.len())];
    let subtree = match node.child(chosen) {
        Some(g) => g,
        None => return unchanged(parent),
    };
    let insert_index = node.child_count();
    if !oracle.admissible(node.kind(), subtree.kind(), insert_index) {
        return unchanged(parent);
    }
    match parent.insert_at(&parent_path, insert_index, subtree) {
        Ok(tree) => child(tree),
        Err(_) => unchanged(parent),
    }
}

/// Removes a random `structural` child whose subtree contains no
/// `essential` gene.
pub fn gene_remove(parent: &Gene, rng: &mut RngHandle) -> VariationOutcome {
    let candidates = removable_structural_paths(parent);
    if candidates.is_empty() {
        return unchanged(parent);
    }
    let path = candidates[rng.below(candidates.len())].clone();
    match parent.remove_at(&path) {
        Ok(tree) => child(tree),
        Err(_) => unchanged(parent),
    }
}

/// Reorders the `structural` children of one randomly chosen internal node.
pub fn gene_shuffle(parent: &Gene, rng: &mut RngHandle) -> VariationOutcome {
    let parents = nodes_with_structural_children(parent, 2);
    if parents.is_empty() {
        return unchanged(parent);
    }
    let parent_path = parents[rng.below(parents.len())].clone();
    let node = match parent.get(&parent_path) {
        Ok(n) => n,
        Err(_) => return unchanged(parent),
    };
    let (kind, payload, flags, mut children) = node.into_parts();
    let indices = structural_child_indices(&Gene::new(
        kind.clone(),
        payload.clone(),
        flags,
        children.clone(),
    ));
    let mut values: Vec<Gene> = indices.iter().map(|&i| children[i].clone()).collect();
    for i in (1..values.len()).rev() {
        let j = rng.below(i + 1);
        values.swap(i, j);
    }
    for (slot, value) in indices.into_iter().zip(values) {
        children[slot] = value;
    }
    let replacement = Gene::new(kind, payload, flags, children);
    match parent.replace_at(&parent_path, replacement) {
        Ok(tree) => child(tree),
        Err(_) => unchanged(parent),
    }
}

/// Replaces a random `structural` subtree in `parent_a` with a random
/// `structural` subtree from `parent_b` whose kind is admissible at the
/// target position. Never targets a subtree containing an `essential`
/// gene, since replacing it discards that gene just as surely as
/// [`gene_remove`] would.
pub fn cross_over(
    parent_a: &Gene,
    parent_b: &Gene,
    oracle: &dyn AdmissibilityOracle,
    rng: &mut RngHandle,
) -> VariationOutcome {
    let targets = removable_structural_paths(parent_a);
    let donors = structural_paths(parent_b);
    if targets.is_empty() || donors.is_empty() {
        return unchanged(parent_a);
    }
    for _ in 0..ADMISSIBILITY_ATTEMPTS {
        let target_path = targets[rng.below(targets.len())].clone();
        let donor_path = donors[rng.below(donors.len())].clone();
        let donor_subtree = match parent_b.get(&donor_path) {
            Ok(g) => g,
            Err(_) => continue,
        };
        let (parent_path, position) = split_last(&target_path);
        let target_parent_kind = match parent_a.get(&parent_path) {
            Ok(g) => g.kind().clone(),
            Err(_) => continue,
        };
        if !oracle.admissible(&target_parent_kind, donor_subtree.kind(), position) {
            continue;
        }
        if let Ok(tree) = parent_a.replace_at(&target_path, donor_subtree) {
            return child(tree);
        }
    }
    unchanged(parent_a)
}

/// Inserts a `structural` subtree from `parent_b` into `parent_a` at an
/// admissible insertion point.
pub fn gene_splice(
    parent_a: &Gene,
    parent_b: &Gene,
    oracle: &dyn AdmissibilityOracle,
    rng: &mut RngHandle,
) -> VariationOutcome {
    let insertion_points = nodes_with_structural_children(parent_a, 0)
        .into_iter()
        .filter(|path| parent_a.get(path).map(|n| !n.flags().leaf).unwrap_or(false))
        .collect::<Vec<_>>();
    let donors = structural_paths(parent_b);
    if insertion_points.is_empty() || donors.is_empty() {
        return unchanged(parent_a);
    }
    for _ in 0..ADMISSIBILITY_ATTEMPTS {
        let insertion_path = insertion_points[rng.below(insertion_points.len())].clone();
        let donor_path = donors[rng.below(donors.len())].clone();
        let donor_subtree = match parent_b.get(&donor_path) {
            Ok(g) => g,
            Err(_) => continue,
        };
        let target = match parent_a.get(&insertion_path) {
            Ok(n) => n,
            Err(_) => continue,
        };
        let position = rng.below(target.child_count() + 1);
        if !oracle.admissible(target.kind(), donor_subtree.kind(), position) {
            continue;
        }
        if let Ok(tree) = parent_a.insert_at(&insertion_path, position, donor_subtree) {
            return child(tree);
        }
    }
    unchanged(parent_a)
}

fn split_last(path: &Path) -> (Path, usize) {
    let mut parent_path = path.clone();
    let last = parent_path.pop().unwrap_or(0);
    (parent_path, last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use choronzon_gene::GeneFlags;

    struct AllowAll;
    impl AdmissibilityOracle for AllowAll {
        fn admissible(&self, _parent: &choronzon_gene::GeneKind, _child: &choronzon_gene::GeneKind, _pos: usize) -> bool {
            true
        }
    }

    fn leaf(kind: &str) -> Gene {
        Gene::leaf(kind, Vec::new(), GeneFlags::structural())
    }

    fn tree() -> Gene {
        Gene::new(
            "ROOT",
            Vec::new(),
            GeneFlags::structural(),
            vec![leaf("A"), leaf("B"), leaf("C")],
        )
    }

    #[test]
    fn gene_swap_reorders_two_children() {
        let t = tree();
        let mut rng = RngHandle::from_seed(1);
        let out = gene_swap(&t, &mut rng);
        assert!(!out.no_op);
        assert_eq!(out.tree.child_count(), 3);
    }

    #[test]
    fn gene_remove_preserves_essential_genes() {
        let t = Gene::new(
            "ROOT",
            Vec::new(),
            GeneFlags::structural(),
            vec![
                Gene::leaf("A", Vec::new(), GeneFlags::structural().with_essential(true)),
                leaf("B"),
            ],
        );
        let mut rng = RngHandle::from_seed(2);
        let out = gene_remove(&t, &mut rng);
        assert!(out.tree.walk().any(|(_, n)| n.kind.as_str() == "A"));
    }

    #[test]
    fn gene_shuffle_keeps_same_children_set() {
        let t = tree();
        let mut rng = RngHandle::from_seed(3);
        let out = gene_shuffle(&t, &mut rng);
        let mut kinds: Vec<_> = out.tree.children().iter().map(|c| c.kind().to_string()).collect();
        kinds.sort();
        assert_eq!(kinds, vec!["A", "B", "C"]);
    }

    #[test]
    fn cross_over_pulls_subtree_from_donor() {
        let a = tree();
        let b = Gene::new(
            "ROOT",
            Vec::new(),
            GeneFlags::structural(),
            vec![leaf("D")],
        );
        let mut rng = RngHandle::from_seed(4);
        let out = cross_over(&a, &b, &AllowAll, &mut rng);
        assert!(!out.no_op);
        assert!(out.tree.children().iter().any(|c| c.kind().as_str() == "D"));
    }

    #[test]
    fn no_op_without_second_structural_child() {
        let t = leaf("A");
        let mut rng = RngHandle::from_seed(5);
        let out = gene_swap(&t, &mut rng);
        assert!(out.no_op);
    }

    #[test]
    fn cross_over_never_replaces_an_essential_subtree() {
        let a = Gene::new(
            "ROOT",
            Vec::new(),
            GeneFlags::structural(),
            vec![Gene::leaf("A", Vec::new(), GeneFlags::structural().with_essential(true))],
        );
        let b = Gene::new("ROOT", Vec::new(), GeneFlags::structural(), vec![leaf("D")]);
        for seed in 0..20u64 {
            let mut rng = RngHandle::from_seed(seed);
            let out = cross_over(&a, &b, &AllowAll, &mut rng);
            assert!(out.tree.walk().any(|(_, n)| n.kind.as_str() == "A"));
        }
    }
}
