//! OwnedHeapTree - a linked heap tree that owns its storage.

use crate::iter::Iter;
use crate::{BoundedStorage, BoxedHeapStorage, Full, HeapNode, HeapTree, Key};

/// A min-heap tree that owns its storage.
///
/// Convenience wrapper around [`HeapTree`] + [`BoxedHeapStorage`] for cases
/// where the nodes don't need to be shared with other structures.
///
/// # Example
///
/// ```
/// use nexus_heaptree::OwnedHeapTree;
///
/// let mut heap: OwnedHeapTree<u64> = OwnedHeapTree::with_capacity(100);
///
/// heap.try_push(5).unwrap();
/// heap.try_push(1).unwrap();
/// let c = heap.try_push(3).unwrap();
///
/// assert_eq!(heap.len(), 3);
/// assert_eq!(heap.peek(), Some(&1));
///
/// // Re-prioritize through the key
/// *heap.get_mut(c).unwrap() = 0;
/// heap.update_key(c);
///
/// assert_eq!(heap.pop(), Some(0));
/// assert_eq!(heap.pop(), Some(1));
/// assert_eq!(heap.pop(), Some(5));
/// assert_eq!(heap.pop(), None);
/// ```
pub struct OwnedHeapTree<T: Ord, K: Key = u32> {
    storage: BoxedHeapStorage<T, K>,
    tree: HeapTree<HeapNode<T, K>, BoxedHeapStorage<T, K>, K>,
}

impl<T: Ord, K: Key> OwnedHeapTree<T, K> {
    /// Creates a new heap tree holding at most `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or does not fit the key type.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: BoxedHeapStorage::with_capacity(capacity),
            tree: HeapTree::new(),
        }
    }

    /// Returns the number of values in the heap.
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the heap is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the storage capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Pushes a value onto the heap.
    ///
    /// Returns the key of the inserted value, usable for O(1) access and
    /// O(log n) removal or priority updates.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if storage is full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<K, Full<T>> {
        self.tree.try_push(&mut self.storage, value)
    }

    /// Removes and returns the minimum value.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.tree.pop(&mut self.storage)
    }

    /// Removes and returns the value at `key`.
    ///
    /// Returns `None` if the key is invalid or not in the heap.
    #[inline]
    pub fn remove(&mut self, key: K) -> Option<T> {
        self.tree.remove(&mut self.storage, key)
    }

    /// Returns a reference to the minimum value.
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.tree.peek_value(&self.storage)
    }

    /// Returns a reference to the value at `key`.
    #[inline]
    pub fn get(&self, key: K) -> Option<&T> {
        self.tree.get(&self.storage, key).map(HeapNode::value)
    }

    /// Returns a mutable reference to the value at `key`.
    ///
    /// Call [`update_key`](Self::update_key) afterwards if the ordering of
    /// the value may have changed.
    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.tree
            .get_mut(&mut self.storage, key)
            .map(HeapNode::value_mut)
    }

    /// Returns `true` if `key` refers to a value in the heap.
    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.tree.contains(&self.storage, key)
    }

    /// Restores heap order after the value at `key` changed.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not in the heap.
    #[inline]
    pub fn update_key(&mut self, key: K) {
        self.tree.fixup(&mut self.storage, key);
    }

    /// Iterates values in position order (not sorted order).
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.nodes().map(HeapNode::value)
    }

    fn nodes(&self) -> Iter<'_, HeapNode<T, K>, BoxedHeapStorage<T, K>, K> {
        self.tree.iter(&self.storage)
    }

    /// Removes and drops every value.
    pub fn clear(&mut self) {
        self.tree.clear(&mut self.storage);
        self.storage.clear();
    }
}

impl<T: Ord + core::fmt::Debug, K: Key> core::fmt::Debug for OwnedHeapTree<T, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
