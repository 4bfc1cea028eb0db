//! Error types for heap tree operations.
//!
//! Both enums describe caller mistakes or corrupted state, never transient
//! conditions: nothing here is worth retrying.

use thiserror::Error;

/// A node was passed to link/unlink in the wrong membership state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The key does not refer to an occupied storage slot.
    #[error("key does not refer to a stored node")]
    InvalidKey,
    /// Linking a node that is already a member of a tree.
    #[error("heap node is already linked")]
    AlreadyLinked,
    /// Unlinking a node that was never linked, or was cleared since.
    #[error("heap node is not linked")]
    NotLinked,
    /// Unlinking a node that was already removed.
    #[error("heap node was already removed")]
    AlreadyRemoved,
}

/// A structural or ordering invariant does not hold.
///
/// Positions are 1-based tree positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A position inside `1..=len` has no node.
    #[error("no node at position {position}")]
    MissingNode {
        /// The empty position.
        position: usize,
    },
    /// A position past `len` holds a node.
    #[error("unexpected node at position {position}")]
    ExtraNode {
        /// The occupied position.
        position: usize,
    },
    /// A node's parent key does not match the node above it.
    #[error("node at position {position} has a broken parent link")]
    BrokenParent {
        /// Position of the node with the bad back-link.
        position: usize,
    },
    /// A reachable node is not marked as a member.
    #[error("node at position {position} is not marked as linked")]
    NotMember {
        /// Position of the unmarked node.
        position: usize,
    },
    /// A node orders before its parent.
    #[error("node at position {position} orders before its parent")]
    OrderViolation {
        /// Position of the out-of-order child.
        position: usize,
    },
}
