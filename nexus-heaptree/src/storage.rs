//! Storage traits for slab-like containers with stable keys.
//!
//! The heap tree never owns nodes. Nodes live in a storage the host
//! controls, and the tree links them together by [`Key`]. A key stays valid
//! until the host removes the value, so a node can leave one tree and join
//! another without moving.
//!
//! ```text
//! Storage<T>               - get, get_mut, remove
//!     │
//!     ├── BoundedStorage<T>   - fixed capacity, try_insert -> Result
//!     │
//!     └── UnboundedStorage<T> - growable, insert -> Key (infallible)
//! ```

use core::fmt;

use crate::Key;

/// Slab-like storage with stable keys.
///
/// # Requirements
///
/// Implementations must provide:
/// - **Stable keys**: a key remains valid until explicitly removed
/// - **O(1)** remove and get operations
/// - **Slot reuse**: removed slots can be reused by future inserts
///
/// # Implementations
///
/// - [`BoxedStorage<T>`] - fixed runtime capacity (in this crate)
/// - `slab::Slab<T>` - growable (feature `slab`)
pub trait Storage<T> {
    /// Key type handed out by this storage.
    type Key: Key;

    /// Removes and returns the value at `key`, if present.
    fn remove(&mut self, key: Self::Key) -> Option<T>;

    /// Returns a reference to the value at `key`, if present.
    fn get(&self, key: Self::Key) -> Option<&T>;

    /// Returns a mutable reference to the value at `key`, if present.
    fn get_mut(&mut self, key: Self::Key) -> Option<&mut T>;

    /// Returns a reference without checking the key.
    ///
    /// # Safety
    ///
    /// `key` must be valid and occupied.
    unsafe fn get_unchecked(&self, key: Self::Key) -> &T;

    /// Returns a mutable reference without checking the key.
    ///
    /// # Safety
    ///
    /// `key` must be valid and occupied.
    unsafe fn get_unchecked_mut(&mut self, key: Self::Key) -> &mut T;

    /// Returns `true` if `key` refers to an occupied slot.
    #[inline]
    fn contains(&self, key: Self::Key) -> bool {
        self.get(key).is_some()
    }
}

/// Storage with a fixed capacity; insertion can fail.
pub trait BoundedStorage<T>: Storage<T> {
    /// Inserts a value, returning its stable key.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if every slot is occupied.
    fn try_insert(&mut self, value: T) -> Result<Self::Key, Full<T>>;

    /// Returns the total number of slots.
    fn capacity(&self) -> usize;
}

/// Storage that grows on demand; insertion cannot fail.
pub trait UnboundedStorage<T>: Storage<T> {
    /// Inserts a value, returning its stable key.
    fn insert(&mut self, value: T) -> Self::Key;
}

/// Error returned when fixed-capacity storage is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be inserted.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage is full")
    }
}

impl<T: fmt::Debug> std::error::Error for Full<T> {}

// =============================================================================
// BoxedStorage - runtime capacity, single allocation, intrusive free list
// =============================================================================

enum Entry<T, K> {
    Occupied(T),
    Vacant { next_free: K },
}

/// Fixed-capacity storage with runtime-determined size.
///
/// One boxed slice of slots, allocated up front. Vacant slots form a LIFO
/// free list threaded through the slice itself, so inserts and removes never
/// allocate.
///
/// # Example
///
/// ```
/// use nexus_heaptree::{BoundedStorage, BoxedStorage, Storage};
///
/// let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(1000);
/// assert_eq!(storage.capacity(), 1000);
///
/// let key = storage.try_insert(42).unwrap();
/// assert_eq!(storage.get(key), Some(&42));
/// ```
pub struct BoxedStorage<T, K: Key = u32> {
    slots: Box<[Entry<T, K>]>,
    /// Head of the free list, `K::NONE` when full.
    free_head: K,
    len: usize,
}

impl<T, K: Key> BoxedStorage<T, K> {
    /// Creates storage with exactly `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or does not fit the key type (the key's
    /// `NONE` value is reserved).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(
            capacity <= K::NONE.as_usize(),
            "capacity exceeds key type maximum"
        );

        Self {
            slots: free_list(capacity),
            free_head: K::from_usize(0),
            len: 0,
        }
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slots are occupied.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if all slots are occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Drops every stored value and makes all slots available again.
    ///
    /// Any heap tree still linking keys from this storage is left dangling;
    /// clear those trees first.
    pub fn clear(&mut self) {
        self.slots = free_list(self.slots.len());
        self.free_head = K::from_usize(0);
        self.len = 0;
    }
}

fn free_list<T, K: Key>(capacity: usize) -> Box<[Entry<T, K>]> {
    (0..capacity)
        .map(|i| Entry::Vacant {
            next_free: if i + 1 < capacity {
                K::from_usize(i + 1)
            } else {
                K::NONE
            },
        })
        .collect()
}

impl<T, K: Key> Storage<T> for BoxedStorage<T, K> {
    type Key = K;

    #[inline]
    fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key.as_usize())?;
        if matches!(slot, Entry::Vacant { .. }) {
            return None;
        }

        let entry = core::mem::replace(
            slot,
            Entry::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = key;
        self.len -= 1;

        match entry {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[inline]
    fn get(&self, key: K) -> Option<&T> {
        match self.slots.get(key.as_usize())? {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[inline]
    fn get_mut(&mut self, key: K) -> Option<&mut T> {
        match self.slots.get_mut(key.as_usize())? {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[inline]
    unsafe fn get_unchecked(&self, key: K) -> &T {
        debug_assert!(self.get(key).is_some(), "vacant key {key:?}");
        // Safety: caller guarantees the key is in bounds and occupied
        match unsafe { self.slots.get_unchecked(key.as_usize()) } {
            Entry::Occupied(value) => value,
            Entry::Vacant { .. } => unsafe { core::hint::unreachable_unchecked() },
        }
    }

    #[inline]
    unsafe fn get_unchecked_mut(&mut self, key: K) -> &mut T {
        debug_assert!(self.get(key).is_some(), "vacant key {key:?}");
        // Safety: caller guarantees the key is in bounds and occupied
        match unsafe { self.slots.get_unchecked_mut(key.as_usize()) } {
            Entry::Occupied(value) => value,
            Entry::Vacant { .. } => unsafe { core::hint::unreachable_unchecked() },
        }
    }
}

impl<T, K: Key> BoundedStorage<T> for BoxedStorage<T, K> {
    #[inline]
    fn try_insert(&mut self, value: T) -> Result<K, Full<T>> {
        let key = self.free_head;
        let Some(slot) = self.slots.get_mut(key.as_usize()) else {
            return Err(Full(value));
        };

        let next_free = match slot {
            Entry::Vacant { next_free } => *next_free,
            Entry::Occupied(_) => unreachable!("free list reached an occupied slot"),
        };

        *slot = Entry::Occupied(value);
        self.free_head = next_free;
        self.len += 1;

        Ok(key)
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T, K: Key> fmt::Debug for BoxedStorage<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedStorage")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

// =============================================================================
// slab::Slab implementation
// =============================================================================

#[cfg(feature = "slab")]
impl<T> Storage<T> for slab::Slab<T> {
    type Key = usize;

    #[inline]
    fn remove(&mut self, key: usize) -> Option<T> {
        self.try_remove(key)
    }

    #[inline]
    fn get(&self, key: usize) -> Option<&T> {
        slab::Slab::get(self, key)
    }

    #[inline]
    fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        slab::Slab::get_mut(self, key)
    }

    #[inline]
    unsafe fn get_unchecked(&self, key: usize) -> &T {
        unsafe { slab::Slab::get_unchecked(self, key) }
    }

    #[inline]
    unsafe fn get_unchecked_mut(&mut self, key: usize) -> &mut T {
        unsafe { slab::Slab::get_unchecked_mut(self, key) }
    }

    #[inline]
    fn contains(&self, key: usize) -> bool {
        slab::Slab::contains(self, key)
    }
}

#[cfg(feature = "slab")]
impl<T> UnboundedStorage<T> for slab::Slab<T> {
    #[inline]
    fn insert(&mut self, value: T) -> usize {
        slab::Slab::insert(self, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let storage: BoxedStorage<u64> = BoxedStorage::with_capacity(16);
        assert!(storage.is_empty());
        assert!(!storage.is_full());
        assert_eq!(storage.len(), 0);
        assert_eq!(storage.capacity(), 16);
    }

    #[test]
    fn insert_get_remove() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(16);

        let key = storage.try_insert(42).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(key), Some(&42));
        assert!(storage.contains(key));

        assert_eq!(storage.remove(key), Some(42));
        assert_eq!(storage.get(key), None);
        assert!(!storage.contains(key));
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn get_mut() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(16);

        let key = storage.try_insert(10).unwrap();
        *storage.get_mut(key).unwrap() = 20;

        assert_eq!(storage.get(key), Some(&20));
    }

    #[test]
    fn fill_to_capacity() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(3);

        let k0 = storage.try_insert(0).unwrap();
        let k1 = storage.try_insert(1).unwrap();
        let k2 = storage.try_insert(2).unwrap();
        assert!(storage.is_full());

        let err = storage.try_insert(3).unwrap_err();
        assert_eq!(err.into_inner(), 3);

        assert_eq!(storage.get(k0), Some(&0));
        assert_eq!(storage.get(k1), Some(&1));
        assert_eq!(storage.get(k2), Some(&2));
    }

    #[test]
    fn slot_reuse_is_lifo() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(4);

        let k0 = storage.try_insert(0).unwrap();
        let k1 = storage.try_insert(1).unwrap();

        storage.remove(k0);
        storage.remove(k1);

        assert_eq!(storage.try_insert(2).unwrap(), k1);
        assert_eq!(storage.try_insert(3).unwrap(), k0);
    }

    #[test]
    fn remove_twice() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(16);

        let key = storage.try_insert(42).unwrap();
        storage.remove(key);

        assert_eq!(storage.remove(key), None);
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn out_of_range_and_sentinel_keys() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(4);
        assert_eq!(storage.get(100), None);
        assert_eq!(storage.get(u32::NONE), None);
        assert_eq!(storage.remove(u32::NONE), None);
    }

    #[test]
    fn clear_drops_values() {
        use std::rc::Rc;

        let shared = Rc::new(());
        let mut storage: BoxedStorage<Rc<()>> = BoxedStorage::with_capacity(8);
        for _ in 0..5 {
            storage.try_insert(Rc::clone(&shared)).unwrap();
        }
        assert_eq!(Rc::strong_count(&shared), 6);

        storage.clear();
        assert_eq!(Rc::strong_count(&shared), 1);
        assert!(storage.is_empty());
        assert_eq!(storage.try_insert(Rc::clone(&shared)).unwrap(), 0);
    }

    #[test]
    fn u8_keys_reserve_sentinel() {
        let mut storage: BoxedStorage<u64, u8> = BoxedStorage::with_capacity(255);
        for i in 0..255u64 {
            storage.try_insert(i).unwrap();
        }
        assert!(storage.is_full());
        assert!(storage.try_insert(255).is_err());
    }

    #[test]
    #[should_panic(expected = "capacity exceeds key type maximum")]
    fn capacity_too_large_for_key() {
        let _storage: BoxedStorage<u64, u8> = BoxedStorage::with_capacity(256);
    }

    #[test]
    fn full_display() {
        assert_eq!(Full(7u32).to_string(), "storage is full");
    }

    #[cfg(feature = "slab")]
    mod slab_tests {
        use super::*;

        #[test]
        fn insert_get_remove() {
            let mut storage = slab::Slab::new();

            let key = UnboundedStorage::insert(&mut storage, 42);
            assert_eq!(Storage::get(&storage, key), Some(&42));

            assert_eq!(Storage::remove(&mut storage, key), Some(42));
            assert_eq!(Storage::get(&storage, key), None);
            assert_eq!(Storage::remove(&mut storage, key), None);
        }
    }
}
