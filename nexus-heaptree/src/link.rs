//! The embedded heap node.
//!
//! A [`HeapLink`] is the small piece of state a host record carries to be
//! part of a heap tree: the keys of its parent and two children, plus a
//! membership tag. Host types expose it through [`Linked`]; callers that do
//! not want to embed anything can wrap their payload in [`HeapNode`].

use core::cmp::Ordering;
use core::fmt;

use crate::Key;
use crate::path::Direction;

/// Membership state of a [`HeapLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never inserted, or explicitly cleared. May be linked.
    Detached,
    /// Currently linked into a tree.
    Member,
    /// Removed from a tree. May be linked again, but not unlinked again.
    Poisoned,
}

/// Parent/child relations of one node inside a heap tree.
///
/// All relations are keys into the same storage the tree uses; `K::NONE`
/// means "no relation". The root of a tree has no parent.
///
/// Cloning a link yields a fresh detached link, so host types can derive
/// `Clone` without duplicating tree membership.
pub struct HeapLink<K: Key = u32> {
    pub(crate) parent: K,
    pub(crate) left: K,
    pub(crate) right: K,
    pub(crate) state: LinkState,
}

impl<K: Key> HeapLink<K> {
    /// Creates a detached link.
    #[inline]
    pub const fn new() -> Self {
        Self {
            parent: K::NONE,
            left: K::NONE,
            right: K::NONE,
            state: LinkState::Detached,
        }
    }

    /// Returns the membership state.
    #[inline]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Returns `true` if the node is currently linked into a tree.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.state == LinkState::Member
    }

    /// Returns `true` if the node was removed from a tree and not relinked.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.state == LinkState::Poisoned
    }

    /// Returns the parent key, or `None` for the root or an unlinked node.
    #[inline]
    pub fn parent(&self) -> Option<K> {
        some(self.parent)
    }

    /// Returns the left child key.
    #[inline]
    pub fn left(&self) -> Option<K> {
        some(self.left)
    }

    /// Returns the right child key.
    #[inline]
    pub fn right(&self) -> Option<K> {
        some(self.right)
    }

    /// Marks an unlinked node as detached again.
    ///
    /// Clearing a poisoned link forgets that it was ever removed.
    ///
    /// # Panics
    ///
    /// Panics if the node is still linked into a tree.
    #[inline]
    pub fn clear(&mut self) {
        assert!(!self.is_linked(), "cannot clear a linked heap node");
        *self = Self::new();
    }

    #[inline]
    pub(crate) fn child(&self, dir: Direction) -> K {
        match dir {
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    #[inline]
    pub(crate) fn attach(&mut self, parent: K) {
        self.parent = parent;
        self.left = K::NONE;
        self.right = K::NONE;
        self.state = LinkState::Member;
    }

    #[inline]
    pub(crate) fn poison(&mut self) {
        self.parent = K::NONE;
        self.left = K::NONE;
        self.right = K::NONE;
        self.state = LinkState::Poisoned;
    }

    #[inline]
    pub(crate) fn detach(&mut self) {
        *self = Self::new();
    }
}

#[inline]
fn some<K: Key>(key: K) -> Option<K> {
    if key.is_none() { None } else { Some(key) }
}

impl<K: Key> Default for HeapLink<K> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> Clone for HeapLink<K> {
    /// Cloning a link creates a new detached link.
    #[inline]
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K: Key> fmt::Debug for HeapLink<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapLink")
            .field("state", &self.state)
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .finish()
    }
}

/// Types that embed a [`HeapLink`] and can therefore be linked into a
/// [`HeapTree`](crate::HeapTree).
///
/// Going from a key back to the host record is a storage lookup, so this
/// trait only needs the record-to-link direction.
///
/// # Example
///
/// ```
/// use nexus_heaptree::{HeapLink, Linked};
///
/// struct Timer {
///     deadline: u64,
///     link: HeapLink<u32>,
/// }
///
/// impl Linked<u32> for Timer {
///     fn link(&self) -> &HeapLink<u32> {
///         &self.link
///     }
///
///     fn link_mut(&mut self) -> &mut HeapLink<u32> {
///         &mut self.link
///     }
/// }
/// ```
pub trait Linked<K: Key> {
    /// Returns the embedded link.
    fn link(&self) -> &HeapLink<K>;

    /// Returns the embedded link mutably.
    ///
    /// Rewriting a linked node's relations corrupts the tree; the tree only
    /// hands this out to itself.
    fn link_mut(&mut self) -> &mut HeapLink<K>;
}

/// A payload paired with its heap link.
///
/// The tree orders `HeapNode`s by their payload, so `HeapNode<T>` is `Ord`
/// whenever `T` is.
#[derive(Debug, Clone)]
pub struct HeapNode<T, K: Key = u32> {
    value: T,
    link: HeapLink<K>,
}

impl<T, K: Key> HeapNode<T, K> {
    /// Wraps a value in a detached node.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            value,
            link: HeapLink::new(),
        }
    }

    /// Returns the payload.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the payload mutably.
    #[inline]
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Unwraps the payload.
    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T, K: Key> Linked<K> for HeapNode<T, K> {
    #[inline]
    fn link(&self) -> &HeapLink<K> {
        &self.link
    }

    #[inline]
    fn link_mut(&mut self) -> &mut HeapLink<K> {
        &mut self.link
    }
}

impl<T: PartialEq, K: Key> PartialEq for HeapNode<T, K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Eq, K: Key> Eq for HeapNode<T, K> {}

impl<T: PartialOrd, K: Key> PartialOrd for HeapNode<T, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl<T: Ord, K: Key> Ord for HeapNode<T, K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_link_is_detached() {
        let link: HeapLink<u32> = HeapLink::new();
        assert_eq!(link.state(), LinkState::Detached);
        assert!(!link.is_linked());
        assert!(link.parent().is_none());
        assert!(link.left().is_none());
        assert!(link.right().is_none());
    }

    #[test]
    fn poison_then_clear() {
        let mut link: HeapLink<u32> = HeapLink::new();
        link.attach(3);
        link.left = 4;
        assert!(link.is_linked());
        assert_eq!(link.parent(), Some(3));

        link.poison();
        assert!(link.is_poisoned());
        assert!(link.parent().is_none());
        assert!(link.left().is_none());

        link.clear();
        assert_eq!(link.state(), LinkState::Detached);
    }

    #[test]
    #[should_panic(expected = "cannot clear a linked heap node")]
    fn clear_linked_panics() {
        let mut link: HeapLink<u32> = HeapLink::new();
        link.attach(u32::NONE);
        link.clear();
    }

    #[test]
    fn clone_is_detached() {
        let mut node = HeapNode::<_, u32>::new(5u64);
        node.link_mut().attach(1);

        let copy = node.clone();
        assert_eq!(*copy.value(), 5);
        assert!(!copy.link().is_linked());
        assert!(node.link().is_linked());
    }

    #[test]
    fn nodes_order_by_value() {
        let a = HeapNode::<_, u32>::new(1);
        let b = HeapNode::<_, u32>::new(2);
        assert!(a < b);
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert_eq!(a, HeapNode::new(1));
    }
}
