//! Arena-backed gene tree and its structural edit primitives.
//!
//! A [`Gene`] owns a flat, pre-order-compacted arena of [`GeneRecord`]s. Every
//! edit operation rebuilds the affected path of the tree into a fresh,
//! independently owned [`Gene`] rather than mutating in place — this makes
//! variation operators trivially restartable and safe to run over a parent
//! tree that other operators are concurrently reading.

use serde::{Deserialize, Serialize};

use crate::error::GeneError;

/// Path to a node within a [`Gene`] tree: a sequence of child indices from
/// the root. The empty path addresses the root itself.
pub type Path = Vec<usize>;

/// Format-defined discriminator for a gene (e.g. a PNG chunk tag).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneKind(String);

impl GeneKind {
    /// Returns the discriminator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GeneKind {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GeneKind {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for GeneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural flags attached to every gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeneFlags {
    /// May be reordered, duplicated, or removed by recombinators.
    pub structural: bool,
    /// Must remain present for serialization to succeed.
    pub essential: bool,
    /// Children are forbidden on this gene.
    pub leaf: bool,
}

impl GeneFlags {
    /// A plain structural, non-essential, non-leaf gene.
    pub const fn structural() -> Self {
        Self {
            structural: true,
            essential: false,
            leaf: false,
        }
    }

    /// An essential leaf gene (e.g. a format signature).
    pub const fn essential_leaf() -> Self {
        Self {
            structural: false,
            essential: true,
            leaf: true,
        }
    }

    /// Returns a copy with `essential` set.
    pub const fn with_essential(mut self, essential: bool) -> Self {
        self.essential = essential;
        self
    }

    /// Returns a copy with `leaf` set.
    pub const fn with_leaf(mut self, leaf: bool) -> Self {
        self.leaf = leaf;
        self
    }

    /// Returns a copy with `structural` set.
    pub const fn with_structural(mut self, structural: bool) -> Self {
        self.structural = structural;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct GeneRecord {
    pub(crate) kind: GeneKind,
    pub(crate) payload: Vec<u8>,
    pub(crate) flags: GeneFlags,
    pub(crate) children: Vec<usize>,
}

/// A read-only view of a single node, yielded by [`Gene::walk`].
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    /// The node's kind discriminator.
    pub kind: &'a GeneKind,
    /// The node's byte payload.
    pub payload: &'a [u8],
    /// The node's structural flags.
    pub flags: GeneFlags,
    /// Number of children this node has.
    pub child_count: usize,
}

/// A node in a chromosome tree, and the tree rooted at it.
///
/// Equality is structural: same kind, same payload bytes, and recursively
/// equal children in the same order. Because the arena is
/// always rebuilt into canonical pre-order form after every edit, deriving
/// `PartialEq` on the arena is sufficient to implement that contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gene {
    pub(crate) arena: Vec<GeneRecord>,
    pub(crate) root: usize,
}

impl Gene {
    /// Constructs a new gene node with the given children, flattening every
    /// child's arena into this node's arena in pre-order.
    pub fn new(
        kind: impl Into<GeneKind>,
        payload: impl Into<Vec<u8>>,
        flags: GeneFlags,
        children: Vec<Gene>,
    ) -> Self {
        let mut arena = Vec::new();
        let root = push_node(&mut arena, kind.into(), payload.into(), flags, children);
        Gene { arena, root }
    }

    /// Constructs a leaf gene (no children).
    pub fn leaf(kind: impl Into<GeneKind>, payload: impl Into<Vec<u8>>, flags: GeneFlags) -> Self {
        Self::new(kind, payload, flags, Vec::new())
    }

    /// The node's kind discriminator.
    pub fn kind(&self) -> &GeneKind {
        &self.arena[self.root].kind
    }

    /// The node's byte payload.
    pub fn payload(&self) -> &[u8] {
        &self.arena[self.root].payload
    }

    /// The node's structural flags.
    pub fn flags(&self) -> GeneFlags {
        self.arena[self.root].flags
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.arena[self.root].children.len()
    }

    /// Total number of nodes in this tree, including the root.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Returns the direct child at `index` as an owned subtree.
    pub fn child(&self, index: usize) -> Option<Gene> {
        let idx = *self.arena[self.root].children.get(index)?;
        Some(self.subtree_gene(idx))
    }

    /// Returns all direct children as owned subtrees.
    pub fn children(&self) -> Vec<Gene> {
        self.arena[self.root]
            .children
            .iter()
            .map(|&idx| self.subtree_gene(idx))
            .collect()
    }

    /// Decomposes the gene into its constituent parts, consuming it.
    pub fn into_parts(self) -> (GeneKind, Vec<u8>, GeneFlags, Vec<Gene>) {
        let children = self.children();
        let rec = self.arena.into_iter().nth(self.root).expect("root exists");
        (rec.kind, rec.payload, rec.flags, children)
    }

    /// Pre-order lazy traversal yielding `(path, node)` pairs, the root first.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            gene: self,
            stack: vec![(self.root, Vec::new())],
        }
    }

    /// Returns the subtree addressed by `path`, or an error if it doesn't exist.
    pub fn get(&self, path: &[usize]) -> Result<Gene, GeneError> {
        let idx = self.resolve(path)?;
        Ok(self.subtree_gene(idx))
    }

    /// Replaces the subtree at `path` with `new_gene`, returning a new tree.
    pub fn replace_at(&self, path: &[usize], new_gene: Gene) -> Result<Gene, GeneError> {
        if path.is_empty() {
            return Ok(new_gene);
        }
        self.rebuild_modified(self.root, path, move |_old| Ok(new_gene))
    }

    /// Inserts `gene` as a new child of the node at `path`, at position `index`.
    pub fn insert_at(&self, path: &[usize], index: usize, gene: Gene) -> Result<Gene, GeneError> {
        let path_owned = path.to_vec();
        self.rebuild_modified(self.root, path, move |node| {
            let (kind, payload, flags, mut children) = node.into_parts();
            if flags.leaf {
                return Err(GeneError::LeafNode(path_owned.clone()));
            }
            if index > children.len() {
                return Err(GeneError::IndexOutOfBounds {
                    index,
                    len: children.len(),
                });
            }
            children.insert(index, gene);
            Ok(Gene::new(kind, payload, flags, children))
        })
    }

    /// Removes the node at `path`, returning a new tree without it.
    pub fn remove_at(&self, path: &[usize]) -> Result<Gene, GeneError> {
        if path.is_empty() {
            return Err(GeneError::CannotRemoveRoot);
        }
        let (parent_path, &last) = path.split_at(path.len() - 1);
        let last = last[0];
        self.rebuild_modified(self.root, parent_path, move |node| {
            let (kind, payload, flags, mut children) = node.into_parts();
            if last >= children.len() {
                return Err(GeneError::IndexOutOfBounds {
                    index: last,
                    len: children.len(),
                });
            }
            children.remove(last);
            Ok(Gene::new(kind, payload, flags, children))
        })
    }

    /// Exchanges the subtrees at two non-overlapping paths.
    pub fn swap(&self, path_a: &[usize], path_b: &[usize]) -> Result<Gene, GeneError> {
        if path_a == path_b {
            return Ok(self.clone());
        }
        if is_prefix(path_a, path_b) || is_prefix(path_b, path_a) {
            return Err(GeneError::OverlappingPaths(path_a.to_vec(), path_b.to_vec()));
        }
        let gene_a = self.get(path_a)?;
        let gene_b = self.get(path_b)?;
        let intermediate = self.replace_at(path_a, gene_b)?;
        intermediate.replace_at(path_b, gene_a)
    }

    fn resolve(&self, path: &[usize]) -> Result<usize, GeneError> {
        let mut idx = self.root;
        for (depth, &pos) in path.iter().enumerate() {
            let rec = &self.arena[idx];
            match rec.children.get(pos) {
                Some(&child) => idx = child,
                None => return Err(GeneError::NoSuchPath(path[..=depth].to_vec())),
            }
        }
        Ok(idx)
    }

    fn subtree_gene(&self, idx: usize) -> Gene {
        let rec = &self.arena[idx];
        let children: Vec<Gene> = rec.children.iter().map(|&c| self.subtree_gene(c)).collect();
        Gene::new(rec.kind.clone(), rec.payload.clone(), rec.flags, children)
    }

    fn rebuild_modified<F>(&self, idx: usize, path: &[usize], op: F) -> Result<Gene, GeneError>
    where
        F: FnOnce(Gene) -> Result<Gene, GeneError>,
    {
        let rec = &self.arena[idx];
        if path.is_empty() {
            return op(self.subtree_gene(idx));
        }
        let pos = path[0];
        let child_idx = *rec
            .children
            .get(pos)
            .ok_or_else(|| GeneError::NoSuchPath(vec![pos]))?;
        let new_child = self.rebuild_modified(child_idx, &path[1..], op)?;
        let mut children: Vec<Gene> = rec.children.iter().map(|&c| self.subtree_gene(c)).collect();
        children[pos] = new_child;
        Ok(Gene::new(
            rec.kind.clone(),
            rec.payload.clone(),
            rec.flags,
            children,
        ))
    }
}

fn is_prefix(prefix: &[usize], of: &[usize]) -> bool {
    prefix.len() <= of.len() && prefix == &of[..prefix.len()]
}

fn push_node(
    arena: &mut Vec<GeneRecord>,
    kind: GeneKind,
    payload: Vec<u8>,
    flags: GeneFlags,
    children: Vec<Gene>,
) -> usize {
    let idx = arena.len();
    arena.push(GeneRecord {
        kind,
        payload,
        flags,
        children: Vec::with_capacity(children.len()),
    });
    let mut child_indices = Vec::with_capacity(children.len());
    for child in children {
        child_indices.push(splice(arena, child));
    }
    arena[idx].children = child_indices;
    idx
}

fn splice(arena: &mut Vec<GeneRecord>, sub: Gene) -> usize {
    let offset = arena.len();
    for mut rec in sub.arena {
        for child in &mut rec.children {
            *child += offset;
        }
        arena.push(rec);
    }
    offset + sub.root
}

/// Lazy pre-order iterator over a [`Gene`] tree, yielded by [`Gene::walk`].
pub struct Walk<'a> {
    gene: &'a Gene,
    stack: Vec<(usize, Path)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (Path, NodeRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, path) = self.stack.pop()?;
        let rec = &self.gene.arena[idx];
        for (pos, &child_idx) in rec.children.iter().enumerate().rev() {
            let mut child_path = path.clone();
            child_path.push(pos);
            self.stack.push((child_idx, child_path));
        }
        Some((
            path,
            NodeRef {
                kind: &rec.kind,
                payload: &rec.payload,
                flags: rec.flags,
                child_count: rec.children.len(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: &str, payload: &[u8]) -> Gene {
        Gene::leaf(kind, payload.to_vec(), GeneFlags::structural())
    }

    #[test]
    fn construct_and_walk_preorder() {
        let root = Gene::new(
            "ROOT",
            vec![],
            GeneFlags::structural(),
            vec![leaf("A", b"1"), leaf("B", b"2")],
        );
        let order: Vec<_> = root.walk().map(|(path, n)| (path, n.kind.to_string())).collect();
        assert_eq!(
            order,
            vec![
                (vec![], "ROOT".to_string()),
                (vec![0], "A".to_string()),
                (vec![1], "B".to_string()),
            ]
        );
    }

    #[test]
    fn structural_equality_ignores_arena_history() {
        let a = Gene::new(
            "ROOT",
            vec![],
            GeneFlags::structural(),
            vec![leaf("A", b"1"), leaf("B", b"2")],
        );
        let b = a.replace_at(&[0], leaf("A", b"1")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn replace_at_root_swaps_whole_tree() {
        let a = leaf("A", b"1");
        let b = leaf("B", b"2");
        assert_eq!(a.replace_at(&[], b.clone()).unwrap(), b);
    }

    #[test]
    fn insert_and_remove_roundtrip() {
        let root = Gene::new(
            "ROOT",
            vec![],
            GeneFlags::structural(),
            vec![leaf("A", b"1")],
        );
        let inserted = root.insert_at(&[], 1, leaf("B", b"2")).unwrap();
        assert_eq!(inserted.child_count(), 2);
        let removed = inserted.remove_at(&[1]).unwrap();
        assert_eq!(removed, root);
    }

    #[test]
    fn remove_root_is_rejected() {
        let root = leaf("A", b"1");
        assert_eq!(root.remove_at(&[]), Err(GeneError::CannotRemoveRoot));
    }

    #[test]
    fn leaf_rejects_insertion() {
        let root = leaf("A", b"1");
        assert!(matches!(
            root.insert_at(&[], 0, leaf("B", b"2")),
            Err(GeneError::LeafNode(_))
        ));
    }

    #[test]
    fn swap_exchanges_siblings() {
        let root = Gene::new(
            "ROOT",
            vec![],
            GeneFlags::structural(),
            vec![leaf("A", b"1"), leaf("B", b"2")],
        );
        let swapped = root.swap(&[0], &[1]).unwrap();
        assert_eq!(swapped.child(0).unwrap().kind().as_str(), "B");
        assert_eq!(swapped.child(1).unwrap().kind().as_str(), "A");
    }

    #[test]
    fn swap_rejects_overlapping_paths() {
        let root = Gene::new(
            "ROOT",
            vec![],
            GeneFlags::structural(),
            vec![Gene::new(
                "P",
                vec![],
                GeneFlags::structural(),
                vec![leaf("C", b"1")],
            )],
        );
        assert!(matches!(
            root.swap(&[0], &[0, 0]),
            Err(GeneError::OverlappingPaths(_, _))
        ));
    }

    #[test]
    fn non_mutation_parent_untouched_after_edit() {
        let root = Gene::new(
            "ROOT",
            vec![],
            GeneFlags::structural(),
            vec![leaf("A", b"1")],
        );
        let before = root.clone();
        let _ = root.insert_at(&[], 1, leaf("B", b"2")).unwrap();
        assert_eq!(root, before);
    }
}
