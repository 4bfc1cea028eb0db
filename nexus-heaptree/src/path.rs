//! Positional navigation in a complete binary tree.
//!
//! Positions are 1-based: the root is position 1 and the children of
//! position `p` are `2p` (left) and `2p + 1` (right). Written in binary, a
//! position spells out its own root-to-node path: the leading 1 bit is the
//! root, and every following bit, most significant first, is one step down
//! (0 = left, 1 = right).
//!
//! ```text
//!              1
//!          /       \
//!        10         11
//!       /  \       /  \
//!     100  101   110  111
//! ```
//!
//! Walking that path from the root reaches any position in
//! `floor(log2(p))` steps without storing an index in the nodes.

/// One step down the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Descend to the left child.
    Left,
    /// Descend to the right child.
    Right,
}

/// Where a position hangs relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Position 1; the tree's root reference.
    Root,
    /// The parent's left child reference.
    Left,
    /// The parent's right child reference.
    Right,
}

impl From<Direction> for Side {
    #[inline]
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::Left => Side::Left,
            Direction::Right => Side::Right,
        }
    }
}

/// The end of a root-to-position walk.
///
/// `parent` is `K::NONE` for position 1. `node` is whatever currently
/// occupies the slot, `K::NONE` for the first free position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<K> {
    /// Node owning the reference that points at this position.
    pub parent: K,
    /// Which of the parent's references it is.
    pub side: Side,
    /// Occupant of the position.
    pub node: K,
}

/// Root-to-position directions for a 1-based position.
///
/// # Example
///
/// ```
/// use nexus_heaptree::{Direction, Path};
///
/// // 6 = 0b110: root, then right, then left
/// let steps: Vec<_> = Path::new(6).collect();
/// assert_eq!(steps, vec![Direction::Right, Direction::Left]);
///
/// assert_eq!(Path::new(1).len(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct Path {
    position: usize,
    /// Bits below `remaining` are still to be walked.
    remaining: u32,
}

impl Path {
    /// Creates the path to `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` is 0.
    #[inline]
    pub fn new(position: usize) -> Self {
        assert!(position > 0, "tree positions are 1-based");
        Self {
            position,
            remaining: Self::depth(position),
        }
    }

    /// Number of steps from the root to `position`, `floor(log2(position))`.
    #[inline]
    pub const fn depth(position: usize) -> u32 {
        usize::BITS - 1 - position.leading_zeros()
    }

    /// Converts a 1-based position to the equivalent 0-based array index.
    #[inline]
    pub const fn to_index(position: usize) -> usize {
        position - 1
    }

    /// Converts a 0-based array index to the equivalent 1-based position.
    #[inline]
    pub const fn from_index(index: usize) -> usize {
        index + 1
    }

    /// Position of the parent of `position`, or 0 for the root.
    #[inline]
    pub const fn parent(position: usize) -> usize {
        position >> 1
    }

    /// Position reached by one step from `position` in `dir`.
    #[inline]
    pub const fn child(position: usize, dir: Direction) -> usize {
        match dir {
            Direction::Left => position << 1,
            Direction::Right => (position << 1) | 1,
        }
    }
}

impl Iterator for Path {
    type Item = Direction;

    #[inline]
    fn next(&mut self) -> Option<Direction> {
        if self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;
        if (self.position >> self.remaining) & 1 == 0 {
            Some(Direction::Left)
        } else {
            Some(Direction::Right)
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.remaining as usize;
        (len, Some(len))
    }
}

impl ExactSizeIterator for Path {}

impl core::iter::FusedIterator for Path {}
