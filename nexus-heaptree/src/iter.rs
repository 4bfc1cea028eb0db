//! Position-order iterators over a heap tree.
//!
//! Every step walks from the root to the next position, so a full pass is
//! O(n log n). The iterators only need the root, the length and a cursor
//! position, which is what lets [`HeapTree::keys_from`] and
//! [`HeapTree::keys_after`] resume from any member.

use core::iter::FusedIterator;
use core::marker::PhantomData;

use crate::{HeapTree, Key, Linked, Storage};

/// Iterator over member keys in position order.
///
/// Created by [`HeapTree::keys`], [`HeapTree::keys_from`] and
/// [`HeapTree::keys_after`].
pub struct Keys<'a, T, S, K: Key> {
    storage: &'a S,
    root: K,
    len: usize,
    position: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T, S, K> Keys<'a, T, S, K>
where
    K: Key,
    T: Linked<K>,
    S: Storage<T, Key = K>,
{
    #[inline]
    pub(crate) fn new(storage: &'a S, root: K, len: usize, position: usize) -> Self {
        Self {
            storage,
            root,
            len,
            position: position.min(len + 1),
            _marker: PhantomData,
        }
    }

    /// The 1-based position the next item comes from.
    ///
    /// Equals `len + 1` once the iterator is exhausted.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }
}

impl<T, S, K> Iterator for Keys<'_, T, S, K>
where
    K: Key,
    T: Linked<K>,
    S: Storage<T, Key = K>,
{
    type Item = K;

    #[inline]
    fn next(&mut self) -> Option<K> {
        if self.position > self.len {
            return None;
        }

        let slot = HeapTree::<T, S, K>::descend(self.storage, self.root, self.position);
        self.position += 1;
        Some(slot.node)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len + 1 - self.position;
        (remaining, Some(remaining))
    }
}

impl<T, S, K> ExactSizeIterator for Keys<'_, T, S, K>
where
    K: Key,
    T: Linked<K>,
    S: Storage<T, Key = K>,
{
}

impl<T, S, K> FusedIterator for Keys<'_, T, S, K>
where
    K: Key,
    T: Linked<K>,
    S: Storage<T, Key = K>,
{
}

/// Iterator over member nodes in position order.
///
/// Created by [`HeapTree::iter`], [`HeapTree::iter_from`] and
/// [`HeapTree::iter_after`].
pub struct Iter<'a, T, S, K: Key> {
    keys: Keys<'a, T, S, K>,
}

impl<'a, T, S, K> Iter<'a, T, S, K>
where
    K: Key,
    T: Linked<K>,
    S: Storage<T, Key = K>,
{
    #[inline]
    pub(crate) fn new(keys: Keys<'a, T, S, K>) -> Self {
        Self { keys }
    }

    /// The 1-based position the next item comes from.
    #[inline]
    pub fn position(&self) -> usize {
        self.keys.position()
    }
}

impl<'a, T, S, K> Iterator for Iter<'a, T, S, K>
where
    K: Key,
    T: Linked<K> + 'a,
    S: Storage<T, Key = K>,
{
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        let key = self.keys.next()?;
        let storage: &'a S = self.keys.storage;
        // Safety: keys yielded by the walk are members, so occupied
        Some(unsafe { storage.get_unchecked(key) })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl<'a, T, S, K> ExactSizeIterator for Iter<'a, T, S, K>
where
    K: Key,
    T: Linked<K> + 'a,
    S: Storage<T, Key = K>,
{
}

impl<'a, T, S, K> FusedIterator for Iter<'a, T, S, K>
where
    K: Key,
    T: Linked<K> + 'a,
    S: Storage<T, Key = K>,
{
}
