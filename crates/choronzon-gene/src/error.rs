//! Errors raised by gene-tree edit primitives.

use thiserror::Error;

use crate::Path;

/// Errors produced by [`crate::Gene`] edit operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneError {
    /// The supplied path does not address an existing node.
    #[error("no node at path {0:?}")]
    NoSuchPath(Path),
    /// `swap` was given two paths where one is an ancestor of the other.
    #[error("paths {0:?} and {1:?} overlap")]
    OverlappingPaths(Path, Path),
    /// An insertion index was out of bounds for the target node's children.
    #[error("insertion index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// Index that was requested.
        index: usize,
        /// Number of children available.
        len: usize,
    },
    /// The target node is a `leaf` gene and cannot receive children.
    #[error("node at path {0:?} is a leaf and cannot receive children")]
    LeafNode(Path),
    /// An operation would have removed the tree's only root node.
    #[error("cannot remove the root node")]
    CannotRemoveRoot,
}
