//! Min-heap as a pointer-linked complete binary tree over external storage.
//!
//! Nodes live in host-owned storage and embed a [`HeapLink`]. The tree keeps
//! only the root key and a count; everything else is parent/left/right keys
//! inside the nodes. There is no backing array and no per-node index.
//!
//! # Shape
//!
//! The tree is always complete: every level full except the last, which
//! fills left to right. Position `len + 1` is therefore the next free slot
//! and position `len` the last occupied one, and both are reached from the
//! root by walking the binary digits of the position (see [`Path`]).
//!
//! # Order
//!
//! Every node orders no later than its children under the comparison the
//! caller passes in. Sifting relinks nodes; payloads never move, so keys
//! stay valid for the whole time a node is a member.
//!
//! # Storage Invariant
//!
//! A tree must always be used with the same storage instance. Passing a
//! different storage is undefined behavior. This is the caller's
//! responsibility to enforce (same discipline as the `slab` crate).
//!
//! # Example
//!
//! ```
//! use nexus_heaptree::{BoxedHeapStorage, HeapNode, HeapTree};
//!
//! let mut storage: BoxedHeapStorage<u64> = BoxedHeapStorage::with_capacity(16);
//! let mut heap: HeapTree<HeapNode<u64>, BoxedHeapStorage<u64>> = HeapTree::new();
//!
//! for value in [5, 3, 8, 1, 9, 2] {
//!     heap.try_push(&mut storage, value).unwrap();
//! }
//!
//! let mut sorted = Vec::new();
//! while let Some(value) = heap.pop(&mut storage) {
//!     sorted.push(value);
//! }
//! assert_eq!(sorted, vec![1, 2, 3, 5, 8, 9]);
//! ```

use core::cmp::Ordering;
use core::fmt;
use core::marker::PhantomData;

use crate::error::{LinkError, TreeError};
use crate::iter::{Iter, Keys};
use crate::link::{HeapLink, HeapNode, LinkState, Linked};
use crate::path::{Direction, Path, Side, Slot};
use crate::{BoundedStorage, BoxedStorage, Full, Key, Storage, UnboundedStorage};

/// Type alias for bounded heap storage backed by a boxed allocation.
pub type BoxedHeapStorage<T, K = u32> = BoxedStorage<HeapNode<T, K>, K>;

/// Type alias for unbounded heap storage backed by `slab::Slab`.
#[cfg(feature = "slab")]
pub type SlabHeapStorage<T> = slab::Slab<HeapNode<T, usize>>;

/// A min-heap whose nodes are linked through their embedded [`HeapLink`].
///
/// # Type Parameters
///
/// - `T`: Node type stored in `S`, embedding a link (see [`Linked`])
/// - `S`: Storage type (e.g., [`BoxedHeapStorage<V>`] for `T = HeapNode<V>`)
/// - `K`: Key type (default `u32`)
///
/// Every ordering operation comes in two forms: `*_by` takes a comparison
/// closure, the plain form uses `T: Ord`. A given tree must be driven with
/// one consistent ordering.
///
/// # Example
///
/// Host records embedding their own link:
///
/// ```
/// use nexus_heaptree::{BoundedStorage, BoxedStorage, HeapLink, HeapTree, Linked, Storage};
///
/// #[derive(Debug)]
/// struct Timer {
///     deadline: u64,
///     link: HeapLink,
/// }
///
/// impl Linked<u32> for Timer {
///     fn link(&self) -> &HeapLink { &self.link }
///     fn link_mut(&mut self) -> &mut HeapLink { &mut self.link }
/// }
///
/// let mut timers: BoxedStorage<Timer> = BoxedStorage::with_capacity(16);
/// let mut wheel: HeapTree<Timer, BoxedStorage<Timer>> = HeapTree::new();
/// let by_deadline = |a: &Timer, b: &Timer| a.deadline.cmp(&b.deadline);
///
/// let late = timers.try_insert(Timer { deadline: 50, link: HeapLink::new() }).unwrap();
/// let soon = timers.try_insert(Timer { deadline: 10, link: HeapLink::new() }).unwrap();
///
/// wheel.link_by(&mut timers, late, by_deadline);
/// wheel.link_by(&mut timers, soon, by_deadline);
/// assert_eq!(wheel.peek_key(), Some(soon));
///
/// // Unlinking keeps the record in storage
/// assert!(wheel.unlink_by(&mut timers, soon, by_deadline));
/// assert_eq!(wheel.peek_key(), Some(late));
/// assert!(timers.get(soon).unwrap().link.is_poisoned());
/// ```
pub struct HeapTree<T, S, K: Key = u32> {
    root: K,
    len: usize,
    _marker: PhantomData<fn() -> (T, S)>,
}

impl<T, S, K: Key> Default for HeapTree<T, S, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, K: Key> fmt::Debug for HeapTree<T, S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapTree")
            .field("root", &self.peek_key())
            .field("len", &self.len)
            .finish()
    }
}

impl<T, S, K: Key> HeapTree<T, S, K> {
    /// Creates an empty tree.
    #[inline]
    pub const fn new() -> Self {
        Self {
            root: K::NONE,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Returns the number of linked nodes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no nodes are linked.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the key of the minimum node without removing it.
    #[inline]
    pub fn peek_key(&self) -> Option<K> {
        self.root.is_some().then_some(self.root)
    }
}

// =============================================================================
// Base impl - any Linked node type, any storage
// =============================================================================

impl<T, S, K> HeapTree<T, S, K>
where
    K: Key,
    T: Linked<K>,
    S: Storage<T, Key = K>,
{
    // ========================================================================
    // Link (insert)
    // ========================================================================

    /// Links a stored node into the tree.
    ///
    /// The node is attached at the first free position and sifted up. It
    /// must be detached or previously unlinked.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not valid in storage or the node is already linked.
    #[inline]
    pub fn link_by<F>(&mut self, storage: &mut S, key: K, cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if let Err(err) = self.try_link_by(storage, key, cmp) {
            panic!("{err}");
        }
    }

    /// Links a stored node into the tree, ordered by `T: Ord`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not valid in storage or the node is already linked.
    #[inline]
    pub fn link(&mut self, storage: &mut S, key: K)
    where
        T: Ord,
    {
        self.link_by(storage, key, T::cmp);
    }

    /// Links a stored node into the tree, reporting contract violations.
    ///
    /// # Errors
    ///
    /// - [`LinkError::InvalidKey`] if `key` is not occupied in storage
    /// - [`LinkError::AlreadyLinked`] if the node is already a member
    pub fn try_link_by<F>(&mut self, storage: &mut S, key: K, mut cmp: F) -> Result<(), LinkError>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let state = match storage.get(key) {
            Some(node) => node.link().state(),
            None => return Err(rejected(LinkError::InvalidKey)),
        };
        if state == LinkState::Member {
            return Err(rejected(LinkError::AlreadyLinked));
        }

        let slot = Self::descend(storage, self.root, self.len + 1);
        debug_assert!(slot.node.is_none(), "first free position is occupied");

        Self::hook_mut(storage, key).attach(slot.parent);
        self.set_child(storage, slot.parent, slot.side, key);
        self.len += 1;

        self.sift_up(storage, key, &mut cmp);
        Ok(())
    }

    /// Checked [`link`](Self::link).
    ///
    /// # Errors
    ///
    /// See [`try_link_by`](Self::try_link_by).
    #[inline]
    pub fn try_link(&mut self, storage: &mut S, key: K) -> Result<(), LinkError>
    where
        T: Ord,
    {
        self.try_link_by(storage, key, T::cmp)
    }

    // ========================================================================
    // Unlink (delete)
    // ========================================================================

    /// Unlinks a member without removing it from storage.
    ///
    /// The node at the last position takes the removed node's place and is
    /// sifted whichever way it needs to go. The removed node is left
    /// poisoned: it may be linked again but not unlinked again.
    ///
    /// Returns `false` if the node was not a member.
    #[inline]
    pub fn unlink_by<F>(&mut self, storage: &mut S, key: K, cmp: F) -> bool
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.try_unlink_by(storage, key, cmp).is_ok()
    }

    /// Unlinks a member, ordered by `T: Ord`.
    ///
    /// Returns `false` if the node was not a member.
    #[inline]
    pub fn unlink(&mut self, storage: &mut S, key: K) -> bool
    where
        T: Ord,
    {
        self.unlink_by(storage, key, T::cmp)
    }

    /// Unlinks a member, reporting why a non-member was rejected.
    ///
    /// # Errors
    ///
    /// - [`LinkError::InvalidKey`] if `key` is not occupied in storage
    /// - [`LinkError::NotLinked`] if the node was never linked
    /// - [`LinkError::AlreadyRemoved`] if the node was already unlinked
    pub fn try_unlink_by<F>(&mut self, storage: &mut S, key: K, mut cmp: F) -> Result<(), LinkError>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let state = match storage.get(key) {
            Some(node) => node.link().state(),
            None => return Err(rejected(LinkError::InvalidKey)),
        };
        match state {
            LinkState::Member => {}
            LinkState::Detached => return Err(rejected(LinkError::NotLinked)),
            LinkState::Poisoned => return Err(rejected(LinkError::AlreadyRemoved)),
        }
        debug_assert!(
            self.position_of(storage, key).is_some(),
            "heap node belongs to a different tree"
        );

        self.detach(storage, key, &mut cmp);
        Ok(())
    }

    /// Checked [`unlink`](Self::unlink).
    ///
    /// # Errors
    ///
    /// See [`try_unlink_by`](Self::try_unlink_by).
    #[inline]
    pub fn try_unlink(&mut self, storage: &mut S, key: K) -> Result<(), LinkError>
    where
        T: Ord,
    {
        self.try_unlink_by(storage, key, T::cmp)
    }

    /// Unlinks the minimum node and returns its key.
    ///
    /// The node stays in storage, poisoned. Returns `None` if empty.
    #[inline]
    pub fn pop_key_by<F>(&mut self, storage: &mut S, mut cmp: F) -> Option<K>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let root = self.peek_key()?;
        self.detach(storage, root, &mut cmp);
        Some(root)
    }

    /// Unlinks the minimum node by `T: Ord` and returns its key.
    #[inline]
    pub fn pop_key(&mut self, storage: &mut S) -> Option<K>
    where
        T: Ord,
    {
        self.pop_key_by(storage, T::cmp)
    }

    /// Detaches every member without touching storage.
    ///
    /// Members end up detached (not poisoned), ready to be linked anywhere.
    pub fn clear(&mut self, storage: &mut S) {
        // Back to front: each walk only crosses positions not yet cleared.
        for position in (1..=self.len).rev() {
            let node = Self::descend(storage, self.root, position).node;
            Self::hook_mut(storage, node).detach();
        }

        tracing::trace!(len = self.len, "heap tree cleared");
        self.root = K::NONE;
        self.len = 0;
    }

    // ========================================================================
    // Priority updates
    // ========================================================================

    /// Restores heap order after a member's priority changed either way.
    ///
    /// # Panics
    ///
    /// Panics if the node is not a member.
    #[inline]
    pub fn fixup_by<F>(&mut self, storage: &mut S, key: K, mut cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.expect_member(storage, key);
        self.restore(storage, key, &mut cmp);
    }

    /// Restores heap order by `T: Ord` after a member's priority changed.
    ///
    /// # Panics
    ///
    /// Panics if the node is not a member.
    #[inline]
    pub fn fixup(&mut self, storage: &mut S, key: K)
    where
        T: Ord,
    {
        self.fixup_by(storage, key, T::cmp);
    }

    /// Restores heap order after a member moved earlier in the ordering.
    ///
    /// # Panics
    ///
    /// Panics if the node is not a member.
    #[inline]
    pub fn decrease_key_by<F>(&mut self, storage: &mut S, key: K, mut cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.expect_member(storage, key);
        self.sift_up(storage, key, &mut cmp);
    }

    /// [`decrease_key_by`](Self::decrease_key_by) using `T: Ord`.
    #[inline]
    pub fn decrease_key(&mut self, storage: &mut S, key: K)
    where
        T: Ord,
    {
        self.decrease_key_by(storage, key, T::cmp);
    }

    /// Restores heap order after a member moved later in the ordering.
    ///
    /// # Panics
    ///
    /// Panics if the node is not a member.
    #[inline]
    pub fn increase_key_by<F>(&mut self, storage: &mut S, key: K, mut cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.expect_member(storage, key);
        self.sift_down(storage, key, &mut cmp);
    }

    /// [`increase_key_by`](Self::increase_key_by) using `T: Ord`.
    #[inline]
    pub fn increase_key(&mut self, storage: &mut S, key: K)
    where
        T: Ord,
    {
        self.increase_key_by(storage, key, T::cmp);
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Returns a reference to the minimum node.
    #[inline]
    pub fn peek<'a>(&self, storage: &'a S) -> Option<&'a T> {
        let root = self.peek_key()?;
        // Safety: the root is a member, so its slot is occupied
        Some(unsafe { storage.get_unchecked(root) })
    }

    /// Returns a reference to the node at `key`.
    #[inline]
    pub fn get<'a>(&self, storage: &'a S, key: K) -> Option<&'a T> {
        storage.get(key)
    }

    /// Returns a mutable reference to the node at `key`.
    ///
    /// Changing how a member orders requires a [`fixup_by`](Self::fixup_by)
    /// afterwards.
    #[inline]
    pub fn get_mut<'a>(&self, storage: &'a mut S, key: K) -> Option<&'a mut T> {
        storage.get_mut(key)
    }

    /// Returns `true` if `key` is a member of this tree.
    ///
    /// O(log n): walks from the node up to the root.
    #[inline]
    pub fn contains(&self, storage: &S, key: K) -> bool {
        self.position_of(storage, key).is_some()
    }

    // ========================================================================
    // Positional navigation
    // ========================================================================

    /// Returns the node at 1-based `position`, or `None` past the end.
    ///
    /// Positions follow array-heap order: the root is 1, the children of
    /// `p` are `2p` and `2p + 1`.
    #[inline]
    pub fn find(&self, storage: &S, position: usize) -> Option<K> {
        if position == 0 || position > self.len {
            return None;
        }
        Some(Self::descend(storage, self.root, position).node)
    }

    /// Walks to 1-based `position`, which may be the first free one.
    ///
    /// Returns `None` for position 0 or anything past `len + 1`.
    #[inline]
    pub fn slot(&self, storage: &S, position: usize) -> Option<Slot<K>> {
        if position == 0 || position > self.len + 1 {
            return None;
        }
        Some(Self::descend(storage, self.root, position))
    }

    /// Recomputes the 1-based position of a member.
    ///
    /// Returns `None` if `key` is not a member of this tree.
    pub fn position_of(&self, storage: &S, key: K) -> Option<usize> {
        if !storage.get(key)?.link().is_linked() {
            return None;
        }

        let mut bits = 0usize;
        let mut depth = 0u32;
        let mut node = key;
        loop {
            let parent = Self::hook(storage, node).parent;
            if parent.is_none() {
                break;
            }
            if depth == usize::BITS - 1 {
                return None;
            }
            if Self::hook(storage, parent).right == node {
                bits |= 1 << depth;
            }
            depth += 1;
            node = parent;
        }

        (node == self.root).then_some((1 << depth) | bits)
    }

    /// Number of levels in the tree, 0 when empty.
    #[inline]
    pub fn depth(&self, storage: &S) -> usize {
        let mut depth = 0;
        let mut node = self.root;
        while node.is_some() {
            depth += 1;
            node = Self::hook(storage, node).left;
        }
        depth
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Returns an iterator over member keys in position order.
    ///
    /// Position order is the storage order 1, 2, 3, ... of the complete
    /// tree, not priority order.
    #[inline]
    pub fn keys<'a>(&self, storage: &'a S) -> Keys<'a, T, S, K> {
        Keys::new(storage, self.root, self.len, 1)
    }

    /// Returns a key iterator starting at `key`'s position, `key` included.
    ///
    /// Yields nothing if `key` is not a member.
    #[inline]
    pub fn keys_from<'a>(&self, storage: &'a S, key: K) -> Keys<'a, T, S, K> {
        let position = self.position_of(storage, key).unwrap_or(self.len + 1);
        Keys::new(storage, self.root, self.len, position)
    }

    /// Returns a key iterator starting just after `key`'s position.
    ///
    /// Yields nothing if `key` is not a member.
    #[inline]
    pub fn keys_after<'a>(&self, storage: &'a S, key: K) -> Keys<'a, T, S, K> {
        let position = self.position_of(storage, key).map_or(self.len + 1, |p| p + 1);
        Keys::new(storage, self.root, self.len, position)
    }

    /// Returns an iterator over member nodes in position order.
    #[inline]
    pub fn iter<'a>(&self, storage: &'a S) -> Iter<'a, T, S, K> {
        Iter::new(self.keys(storage))
    }

    /// Returns a node iterator starting at `key`'s position, `key` included.
    #[inline]
    pub fn iter_from<'a>(&self, storage: &'a S, key: K) -> Iter<'a, T, S, K> {
        Iter::new(self.keys_from(storage, key))
    }

    /// Returns a node iterator starting just after `key`'s position.
    #[inline]
    pub fn iter_after<'a>(&self, storage: &'a S, key: K) -> Iter<'a, T, S, K> {
        Iter::new(self.keys_after(storage, key))
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Checks every structural and ordering invariant.
    ///
    /// O(n log n). Intended for tests and debugging.
    ///
    /// # Errors
    ///
    /// Returns the first [`TreeError`] found, scanning in position order.
    pub fn validate_by<F>(&self, storage: &S, mut cmp: F) -> Result<(), TreeError>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.check(storage, &mut cmp).inspect_err(|err| {
            tracing::debug!(%err, len = self.len, "heap tree failed validation");
        })
    }

    /// [`validate_by`](Self::validate_by) using `T: Ord`.
    ///
    /// # Errors
    ///
    /// Returns the first [`TreeError`] found, scanning in position order.
    #[inline]
    pub fn validate(&self, storage: &S) -> Result<(), TreeError>
    where
        T: Ord,
    {
        self.validate_by(storage, T::cmp)
    }

    fn check<F>(&self, storage: &S, cmp: &mut F) -> Result<(), TreeError>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if self.len == 0 {
            return match self.root.is_none() {
                true => Ok(()),
                false => Err(TreeError::ExtraNode { position: 1 }),
            };
        }

        // Ancestors are checked before descendants, so every walk below only
        // crosses nodes already known to be present.
        for position in 1..=self.len {
            let mut parent = K::NONE;
            let mut node = self.root;
            for dir in Path::new(position) {
                parent = node;
                node = Self::hook(storage, parent).child(dir);
            }

            let Some(entry) = storage.get(node) else {
                return Err(TreeError::MissingNode { position });
            };
            let link = entry.link();

            if !link.is_linked() {
                return Err(TreeError::NotMember { position });
            }
            if link.parent != parent {
                return Err(TreeError::BrokenParent { position });
            }
            if parent.is_some() {
                // Safety: parent was validated at an earlier position
                let above = unsafe { storage.get_unchecked(parent) };
                if cmp(entry, above).is_lt() {
                    return Err(TreeError::OrderViolation { position });
                }
            }

            for dir in [Direction::Left, Direction::Right] {
                let child = Path::child(position, dir);
                if child > self.len && link.child(dir).is_some() {
                    return Err(TreeError::ExtraNode { position: child });
                }
            }
        }

        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Walks from `root` to 1-based `position`.
    ///
    /// Every position above `position` must be occupied, which holds for
    /// anything up to `len + 1`.
    #[inline]
    pub(crate) fn descend(storage: &S, root: K, position: usize) -> Slot<K> {
        let mut slot = Slot {
            parent: K::NONE,
            side: Side::Root,
            node: root,
        };

        for dir in Path::new(position) {
            debug_assert!(slot.node.is_some(), "walk left the tree above {position}");
            slot.parent = slot.node;
            slot.node = Self::hook(storage, slot.node).child(dir);
            slot.side = dir.into();
        }

        slot
    }

    #[inline]
    fn hook<'a>(storage: &'a S, key: K) -> &'a HeapLink<K>
    where
        T: 'a,
    {
        // Safety: only called with member keys, whose slots are occupied
        unsafe { storage.get_unchecked(key) }.link()
    }

    #[inline]
    fn hook_mut<'a>(storage: &'a mut S, key: K) -> &'a mut HeapLink<K>
    where
        T: 'a,
    {
        // Safety: only called with member keys, whose slots are occupied
        unsafe { storage.get_unchecked_mut(key) }.link_mut()
    }

    #[inline]
    fn less<F>(storage: &S, a: K, b: K, cmp: &mut F) -> bool
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        // Safety: both are member keys
        unsafe { cmp(storage.get_unchecked(a), storage.get_unchecked(b)) }.is_lt()
    }

    fn expect_member(&self, storage: &S, key: K) {
        match storage.get(key) {
            None => panic!("{}", LinkError::InvalidKey),
            Some(node) if !node.link().is_linked() => panic!("{}", LinkError::NotLinked),
            Some(_) => {}
        }
        debug_assert!(
            self.position_of(storage, key).is_some(),
            "heap node belongs to a different tree"
        );
    }

    /// Which reference of `parent` points at `child`.
    #[inline]
    fn side_of(storage: &S, parent: K, child: K) -> Side {
        if parent.is_none() {
            Side::Root
        } else if Self::hook(storage, parent).left == child {
            Side::Left
        } else {
            Side::Right
        }
    }

    #[inline]
    fn set_child(&mut self, storage: &mut S, parent: K, side: Side, child: K) {
        match side {
            Side::Root => self.root = child,
            Side::Left => Self::hook_mut(storage, parent).left = child,
            Side::Right => Self::hook_mut(storage, parent).right = child,
        }
    }

    /// Removes a member, refilling its position from the last one.
    fn detach<F>(&mut self, storage: &mut S, key: K, cmp: &mut F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let last = Self::descend(storage, self.root, self.len);
        self.set_child(storage, last.parent, last.side, K::NONE);
        self.len -= 1;

        if last.node != key {
            // Read after the unhook: if `last` was a child of `key` it is
            // already gone from these.
            let link = Self::hook(storage, key);
            let (parent, left, right) = (link.parent, link.left, link.right);

            let side = Self::side_of(storage, parent, key);
            self.set_child(storage, parent, side, last.node);
            if left.is_some() {
                Self::hook_mut(storage, left).parent = last.node;
            }
            if right.is_some() {
                Self::hook_mut(storage, right).parent = last.node;
            }

            let moved = Self::hook_mut(storage, last.node);
            moved.parent = parent;
            moved.left = left;
            moved.right = right;

            self.restore(storage, last.node, cmp);
        }

        Self::hook_mut(storage, key).poison();
    }

    /// Sifts a node up or down, whichever its neighbours call for.
    #[inline]
    fn restore<F>(&mut self, storage: &mut S, key: K, cmp: &mut F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if !self.sift_up(storage, key, cmp) {
            self.sift_down(storage, key, cmp);
        }
    }

    /// Returns `true` if the node moved.
    fn sift_up<F>(&mut self, storage: &mut S, key: K, cmp: &mut F) -> bool
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut moved = false;
        loop {
            let parent = Self::hook(storage, key).parent;
            if parent.is_none() || !Self::less(storage, key, parent, cmp) {
                return moved;
            }
            self.swap_with_parent(storage, key);
            moved = true;
        }
    }

    fn sift_down<F>(&mut self, storage: &mut S, key: K, cmp: &mut F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        loop {
            let link = Self::hook(storage, key);
            let (left, right) = (link.left, link.right);
            if left.is_none() {
                return;
            }

            // Ties go left
            let child = if right.is_some() && Self::less(storage, right, left, cmp) {
                right
            } else {
                left
            };

            if !Self::less(storage, child, key, cmp) {
                return;
            }
            self.swap_with_parent(storage, child);
        }
    }

    /// Exchanges `node` with its parent by relinking both, and their
    /// neighbours, in place.
    fn swap_with_parent(&mut self, storage: &mut S, node: K) {
        let (parent, node_left, node_right) = {
            let link = Self::hook(storage, node);
            (link.parent, link.left, link.right)
        };
        let (grand, parent_left, parent_right) = {
            let link = Self::hook(storage, parent);
            (link.parent, link.left, link.right)
        };

        let side = Self::side_of(storage, grand, parent);
        self.set_child(storage, grand, side, node);

        let link = Self::hook_mut(storage, node);
        link.parent = grand;
        let sibling = if parent_left == node {
            link.left = parent;
            link.right = parent_right;
            parent_right
        } else {
            link.left = parent_left;
            link.right = parent;
            parent_left
        };

        let link = Self::hook_mut(storage, parent);
        link.parent = node;
        link.left = node_left;
        link.right = node_right;

        if sibling.is_some() {
            Self::hook_mut(storage, sibling).parent = node;
        }
        if node_left.is_some() {
            Self::hook_mut(storage, node_left).parent = parent;
        }
        if node_right.is_some() {
            Self::hook_mut(storage, node_right).parent = parent;
        }
    }
}

#[inline]
fn rejected(err: LinkError) -> LinkError {
    tracing::debug!(%err, "heap link rejected");
    err
}

/// Lifts a payload comparison to [`HeapNode`]s.
#[inline]
fn by_value<T, K, F>(mut cmp: F) -> impl FnMut(&HeapNode<T, K>, &HeapNode<T, K>) -> Ordering
where
    K: Key,
    F: FnMut(&T, &T) -> Ordering,
{
    move |a: &HeapNode<T, K>, b: &HeapNode<T, K>| cmp(a.value(), b.value())
}

// =============================================================================
// HeapNode impl - trees that own payloads through their storage
// =============================================================================

impl<T, S, K> HeapTree<HeapNode<T, K>, S, K>
where
    K: Key,
    S: Storage<HeapNode<T, K>, Key = K>,
{
    /// Removes the minimum node from the tree and from storage.
    ///
    /// Returns `None` if the tree is empty.
    #[inline]
    pub fn pop_by<F>(&mut self, storage: &mut S, cmp: F) -> Option<T>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let key = self.pop_key_by(storage, by_value(cmp))?;
        storage.remove(key).map(HeapNode::into_value)
    }

    /// Removes the minimum by `T: Ord` from the tree and from storage.
    #[inline]
    pub fn pop(&mut self, storage: &mut S) -> Option<T>
    where
        T: Ord,
    {
        self.pop_by(storage, T::cmp)
    }

    /// Removes a node from the tree and from storage.
    ///
    /// Returns `None` if `key` is invalid or not a member.
    #[inline]
    pub fn remove_by<F>(&mut self, storage: &mut S, key: K, cmp: F) -> Option<T>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if !self.unlink_by(storage, key, by_value(cmp)) {
            return None;
        }
        storage.remove(key).map(HeapNode::into_value)
    }

    /// Removes a node by `T: Ord` from the tree and from storage.
    ///
    /// Returns `None` if `key` is invalid or not a member.
    #[inline]
    pub fn remove(&mut self, storage: &mut S, key: K) -> Option<T>
    where
        T: Ord,
    {
        self.remove_by(storage, key, T::cmp)
    }

    /// Returns a reference to the minimum payload.
    #[inline]
    pub fn peek_value<'a>(&self, storage: &'a S) -> Option<&'a T>
    where
        K: 'a,
    {
        self.peek(storage).map(HeapNode::value)
    }
}

// =============================================================================
// Bounded storage impl - fallible insertion
// =============================================================================

impl<T, S, K> HeapTree<HeapNode<T, K>, S, K>
where
    K: Key,
    S: BoundedStorage<HeapNode<T, K>, Key = K>,
{
    /// Stores a value and links it into the tree.
    ///
    /// Returns the key of the new node.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if storage is full.
    #[inline]
    pub fn try_push_by<F>(&mut self, storage: &mut S, value: T, cmp: F) -> Result<K, Full<T>>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let key = storage
            .try_insert(HeapNode::new(value))
            .map_err(|Full(node)| Full(node.into_value()))?;
        self.link_by(storage, key, by_value(cmp));
        Ok(key)
    }

    /// Stores a value and links it by `T: Ord`.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if storage is full.
    #[inline]
    pub fn try_push(&mut self, storage: &mut S, value: T) -> Result<K, Full<T>>
    where
        T: Ord,
    {
        self.try_push_by(storage, value, T::cmp)
    }
}

// =============================================================================
// Unbounded storage impl - infallible insertion
// =============================================================================

impl<T, S, K> HeapTree<HeapNode<T, K>, S, K>
where
    K: Key,
    S: UnboundedStorage<HeapNode<T, K>, Key = K>,
{
    /// Stores a value and links it into the tree.
    ///
    /// Returns the key of the new node.
    #[inline]
    pub fn push_by<F>(&mut self, storage: &mut S, value: T, cmp: F) -> K
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let key = storage.insert(HeapNode::new(value));
        self.link_by(storage, key, by_value(cmp));
        key
    }

    /// Stores a value and links it by `T: Ord`.
    #[inline]
    pub fn push(&mut self, storage: &mut S, value: T) -> K
    where
        T: Ord,
    {
        self.push_by(storage, value, T::cmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Storage16 = BoxedHeapStorage<u32>;
    type Tree = HeapTree<HeapNode<u32>, Storage16>;

    fn filled(values: &[u32]) -> (Storage16, Tree, Vec<u32>) {
        let mut storage = Storage16::with_capacity(values.len().max(1));
        let mut tree = Tree::new();
        let keys = values
            .iter()
            .map(|&v| tree.try_push(&mut storage, v).unwrap())
            .collect();
        (storage, tree, keys)
    }

    fn drain(tree: &mut Tree, storage: &mut Storage16) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(v) = tree.pop(storage) {
            tree.validate(storage).unwrap();
            out.push(v);
        }
        out
    }

    #[test]
    fn new_is_empty() {
        let tree = Tree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(tree.peek_key().is_none());
    }

    #[test]
    fn push_pop_single() {
        let (mut storage, mut tree, keys) = filled(&[5]);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.peek_key(), Some(keys[0]));
        assert_eq!(tree.peek_value(&storage), Some(&5));

        assert_eq!(tree.pop(&mut storage), Some(5));
        assert!(tree.is_empty());
        assert!(storage.is_empty());
        assert_eq!(tree.pop(&mut storage), None);
    }

    #[test]
    fn pops_in_order() {
        let (mut storage, mut tree, _) = filled(&[5, 3, 8, 1, 9, 2]);
        tree.validate(&storage).unwrap();
        assert_eq!(drain(&mut tree, &mut storage), vec![1, 2, 3, 5, 8, 9]);
    }

    #[test]
    fn duplicates_pop_together() {
        let (mut storage, mut tree, _) = filled(&[4, 1, 4, 1, 4, 1, 0]);
        assert_eq!(drain(&mut tree, &mut storage), vec![0, 1, 1, 1, 4, 4, 4]);
    }

    #[test]
    fn shape_follows_insertion_positions() {
        // Ascending input never sifts, so position p holds the p-th value.
        let (storage, tree, keys) = filled(&[10, 20, 30, 40, 50, 60, 70]);
        for (i, &key) in keys.iter().enumerate() {
            assert_eq!(tree.find(&storage, i + 1), Some(key));
            assert_eq!(tree.position_of(&storage, key), Some(i + 1));
        }
        assert_eq!(tree.find(&storage, 0), None);
        assert_eq!(tree.find(&storage, 8), None);
        assert_eq!(tree.depth(&storage), 3);
    }

    #[test]
    fn sift_up_relinks_instead_of_moving() {
        let (storage, tree, keys) = filled(&[3, 2, 1]);
        // The key for value 1 is now the root; keys still map to their values.
        assert_eq!(tree.peek_key(), Some(keys[2]));
        assert_eq!(storage.get(keys[0]).unwrap().value(), &3);
        assert_eq!(storage.get(keys[1]).unwrap().value(), &2);
        assert_eq!(storage.get(keys[2]).unwrap().value(), &1);
        tree.validate(&storage).unwrap();
    }

    #[test]
    fn slot_reports_first_free_position() {
        let (storage, tree, keys) = filled(&[1, 2, 3, 4]);

        let slot = tree.slot(&storage, 5).unwrap();
        assert_eq!(slot.parent, keys[1]);
        assert_eq!(slot.side, Side::Right);
        assert!(slot.node.is_none());

        let root = tree.slot(&storage, 1).unwrap();
        assert_eq!(root.side, Side::Root);
        assert!(root.parent.is_none());
        assert_eq!(root.node, keys[0]);

        assert!(tree.slot(&storage, 6).is_none());
        assert!(tree.slot(&storage, 0).is_none());
    }

    #[test]
    fn empty_tree_slot_is_root() {
        let storage = Storage16::with_capacity(1);
        let tree = Tree::new();
        let slot = tree.slot(&storage, 1).unwrap();
        assert_eq!(slot.side, Side::Root);
        assert!(slot.node.is_none());
        assert_eq!(tree.depth(&storage), 0);
    }

    #[test]
    fn remove_last_position() {
        let (mut storage, mut tree, keys) = filled(&[1, 2, 3, 4]);
        assert_eq!(tree.remove(&mut storage, keys[3]), Some(4));
        assert_eq!(tree.len(), 3);
        tree.validate(&storage).unwrap();
        assert_eq!(drain(&mut tree, &mut storage), vec![1, 2, 3]);
    }

    #[test]
    fn remove_middle_sifts_down() {
        // 1 / (2, 3) / (4, 5, 9): 9 lands at position 2 and drops below 4
        let (mut storage, mut tree, keys) = filled(&[1, 2, 3, 4, 5, 9]);
        assert_eq!(tree.remove(&mut storage, keys[1]), Some(2));
        tree.validate(&storage).unwrap();
        assert_eq!(tree.position_of(&storage, keys[3]), Some(2));
        assert_eq!(tree.position_of(&storage, keys[5]), Some(4));
        assert_eq!(drain(&mut tree, &mut storage), vec![1, 3, 4, 5, 9]);
    }

    #[test]
    fn remove_middle_sifts_up() {
        // 1 / (10, 2) / (11, 12, 3, 4): last (4) replaces 11's subtree root
        let (mut storage, mut tree, keys) = filled(&[1, 10, 2, 11, 12, 3, 4]);
        assert_eq!(tree.remove(&mut storage, keys[3]), Some(11));
        tree.validate(&storage).unwrap();
        let position = tree.position_of(&storage, keys[6]).unwrap();
        assert_eq!(position, 2, "4 should have climbed above 10");
        assert_eq!(drain(&mut tree, &mut storage), vec![1, 2, 3, 4, 10, 12]);
    }

    #[test]
    fn remove_parent_of_last() {
        let (mut storage, mut tree, keys) = filled(&[1, 2, 3, 4]);
        // keys[1] sits at position 2, the parent of the last position
        assert_eq!(tree.remove(&mut storage, keys[1]), Some(2));
        tree.validate(&storage).unwrap();
        assert_eq!(drain(&mut tree, &mut storage), vec![1, 3, 4]);
    }

    #[test]
    fn remove_root_of_two() {
        let (mut storage, mut tree, keys) = filled(&[1, 2]);
        assert_eq!(tree.remove(&mut storage, keys[0]), Some(1));
        assert_eq!(tree.peek_key(), Some(keys[1]));
        tree.validate(&storage).unwrap();
    }

    #[test]
    fn remove_rejects_non_members() {
        let (mut storage, mut tree, keys) = filled(&[1, 2, 3]);
        assert_eq!(tree.remove(&mut storage, keys[1]), Some(2));
        // slot freed
        assert_eq!(tree.remove(&mut storage, keys[1]), None);
        assert_eq!(tree.remove(&mut storage, 999), None);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn unlink_poisons_and_relink_works() {
        let (mut storage, mut tree, keys) = filled(&[4, 2, 6]);

        assert!(tree.unlink(&mut storage, keys[1]));
        assert!(storage.get(keys[1]).unwrap().link().is_poisoned());
        assert_eq!(
            tree.try_unlink(&mut storage, keys[1]),
            Err(LinkError::AlreadyRemoved)
        );
        assert!(!tree.contains(&storage, keys[1]));

        tree.try_link(&mut storage, keys[1]).unwrap();
        assert!(tree.contains(&storage, keys[1]));
        assert_eq!(tree.peek_key(), Some(keys[1]));
        tree.validate(&storage).unwrap();
    }

    #[test]
    fn link_errors() {
        let mut storage = Storage16::with_capacity(4);
        let mut tree = Tree::new();

        let key = storage.try_insert(HeapNode::new(1)).unwrap();
        assert_eq!(tree.try_unlink(&mut storage, key), Err(LinkError::NotLinked));

        tree.try_link(&mut storage, key).unwrap();
        assert_eq!(tree.try_link(&mut storage, key), Err(LinkError::AlreadyLinked));
        assert_eq!(tree.try_link(&mut storage, 3), Err(LinkError::InvalidKey));
        assert_eq!(tree.try_unlink(&mut storage, 3), Err(LinkError::InvalidKey));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    #[should_panic(expected = "heap node is already linked")]
    fn double_link_panics() {
        let (mut storage, mut tree, keys) = filled(&[1]);
        tree.link(&mut storage, keys[0]);
    }

    #[test]
    #[should_panic(expected = "heap node is not linked")]
    fn fixup_detached_panics() {
        let mut storage = Storage16::with_capacity(1);
        let mut tree = Tree::new();
        let key = storage.try_insert(HeapNode::new(1)).unwrap();
        tree.fixup(&mut storage, key);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "heap node belongs to a different tree")]
    fn fixup_other_tree_member_panics() {
        let mut storage = Storage16::with_capacity(4);
        let mut a = Tree::new();
        let mut b = Tree::new();
        a.try_push(&mut storage, 5).unwrap();
        b.try_push(&mut storage, 3).unwrap();
        let kb = b.try_push(&mut storage, 4).unwrap();

        *storage.get_mut(kb).unwrap().value_mut() = 0;
        a.fixup(&mut storage, kb);
    }

    #[test]
    fn peek_key_tracks_root() {
        let (mut storage, mut tree, keys) = filled(&[2, 1]);
        assert_eq!(tree.peek_key(), Some(keys[1]));
        assert_eq!(tree.peek_value(&storage), Some(&1));

        tree.pop(&mut storage);
        tree.pop(&mut storage);
        assert_eq!(tree.peek_key(), None);
        assert_eq!(tree.peek_value(&storage), None);
    }

    #[test]
    fn decrease_key() {
        let (mut storage, mut tree, keys) = filled(&[10, 5, 3]);

        *storage.get_mut(keys[0]).unwrap().value_mut() = 1;
        tree.decrease_key(&mut storage, keys[0]);

        assert_eq!(tree.peek_key(), Some(keys[0]));
        tree.validate(&storage).unwrap();
    }

    #[test]
    fn increase_key() {
        let (mut storage, mut tree, keys) = filled(&[1, 5, 10]);

        *storage.get_mut(keys[0]).unwrap().value_mut() = 100;
        tree.increase_key(&mut storage, keys[0]);

        assert_eq!(tree.peek_key(), Some(keys[1]));
        tree.validate(&storage).unwrap();
    }

    #[test]
    fn fixup_either_direction() {
        let (mut storage, mut tree, keys) = filled(&[1, 2, 3, 4, 5, 6, 7, 8]);

        *storage.get_mut(keys[7]).unwrap().value_mut() = 0;
        tree.fixup(&mut storage, keys[7]);
        tree.validate(&storage).unwrap();
        assert_eq!(tree.peek_key(), Some(keys[7]));

        *storage.get_mut(keys[7]).unwrap().value_mut() = 50;
        tree.fixup(&mut storage, keys[7]);
        tree.validate(&storage).unwrap();

        assert_eq!(drain(&mut tree, &mut storage), vec![1, 2, 3, 4, 5, 6, 7, 50]);
    }

    #[test]
    fn ties_prefer_left_child() {
        // root 0 with two equal children; popping the root must promote the
        // last node, then sift it toward the left child on the tie.
        let (mut storage, mut tree, keys) = filled(&[0, 5, 5, 9]);
        tree.pop(&mut storage);
        assert_eq!(tree.peek_key(), Some(keys[1]));
        tree.validate(&storage).unwrap();
    }

    #[test]
    fn custom_comparison_max_heap() {
        let mut storage = Storage16::with_capacity(8);
        let mut tree = Tree::new();
        let rev = |a: &u32, b: &u32| b.cmp(a);

        for v in [3, 9, 1, 7] {
            tree.try_push_by(&mut storage, v, rev).unwrap();
        }

        let mut out = Vec::new();
        while let Some(v) = tree.pop_by(&mut storage, rev) {
            out.push(v);
        }
        assert_eq!(out, vec![9, 7, 3, 1]);
    }

    #[test]
    fn full_storage_returns_value() {
        let mut storage = Storage16::with_capacity(1);
        let mut tree = Tree::new();
        tree.try_push(&mut storage, 1).unwrap();
        assert_eq!(tree.try_push(&mut storage, 2), Err(Full(2)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn clear_detaches_members() {
        let (mut storage, mut tree, keys) = filled(&[4, 3, 2, 1]);
        tree.clear(&mut storage);

        assert!(tree.is_empty());
        assert_eq!(storage.len(), 4);
        for key in &keys {
            assert_eq!(storage.get(*key).unwrap().link().state(), LinkState::Detached);
        }

        // Detached nodes can join a new tree
        let mut other = Tree::new();
        for key in keys {
            other.link(&mut storage, key);
        }
        assert_eq!(drain(&mut other, &mut storage), vec![1, 2, 3, 4]);
    }

    #[test]
    fn validate_catches_order_violation() {
        let (mut storage, tree, keys) = filled(&[1, 2, 3]);
        *storage.get_mut(keys[0]).unwrap().value_mut() = 10;
        assert_eq!(
            tree.validate(&storage),
            Err(TreeError::OrderViolation { position: 2 })
        );
    }

    #[test]
    fn position_of_other_tree_member_is_none() {
        let mut storage = Storage16::with_capacity(4);
        let mut a = Tree::new();
        let mut b = Tree::new();
        let ka = a.try_push(&mut storage, 1).unwrap();
        let kb = b.try_push(&mut storage, 2).unwrap();

        assert_eq!(a.position_of(&storage, ka), Some(1));
        assert_eq!(a.position_of(&storage, kb), None);
        assert!(!a.contains(&storage, kb));
    }

    #[test]
    fn stress_push_pop() {
        let mut storage = Storage16::with_capacity(1024);
        let mut tree = Tree::new();

        for i in 0..1000u32 {
            tree.try_push(&mut storage, (i * 7 + 13) % 1000).unwrap();
        }
        tree.validate(&storage).unwrap();
        assert_eq!(tree.depth(&storage), 10);

        let mut last = 0;
        while let Some(v) = tree.pop(&mut storage) {
            assert!(v >= last, "heap order violated");
            last = v;
        }
    }

    #[test]
    fn stress_remove_middle() {
        let mut storage = Storage16::with_capacity(256);
        let mut tree = Tree::new();

        let keys: Vec<_> = (0..200u32)
            .map(|i| tree.try_push(&mut storage, (i * 37) % 101).unwrap())
            .collect();

        for key in keys.iter().step_by(3) {
            assert!(tree.remove(&mut storage, *key).is_some());
            tree.validate(&storage).unwrap();
        }
        assert_eq!(tree.len(), 200 - 67);

        let values = drain(&mut tree, &mut storage);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[cfg(feature = "slab")]
    mod slab_tests {
        use super::*;

        #[test]
        fn slab_push_infallible() {
            let mut storage: SlabHeapStorage<u64> = slab::Slab::with_capacity(4);
            let mut tree: HeapTree<HeapNode<u64, usize>, SlabHeapStorage<u64>, usize> =
                HeapTree::new();

            // Grows past the initial capacity
            for v in [9, 4, 7, 1, 8, 2, 6] {
                tree.push(&mut storage, v);
            }
            tree.validate(&storage).unwrap();

            let mut out = Vec::new();
            while let Some(v) = tree.pop(&mut storage) {
                out.push(v);
            }
            assert_eq!(out, vec![1, 2, 4, 6, 7, 8, 9]);
            assert!(storage.is_empty());
        }
    }
}
