//! Intrusive min-heap laid out as a pointer-linked complete binary tree.
//!
//! Array heaps keep their elements in a `Vec` and move them around on every
//! sift. This crate keeps the heap shape but drops the array: each node
//! carries its own parent/left/right keys, lives in caller-owned storage,
//! and never moves once stored. Sifting relinks nodes instead of swapping
//! payloads.
//!
//! # Design Philosophy
//!
//! Separate storage from structure:
//!
//! ```text
//! Storage (Slab)  - owns data, provides stable keys
//! HeapTree        - root key + count, links keys into a heap
//! ```
//!
//! Benefits:
//! - **Stable keys**: a node keeps its key for its whole life, through any
//!   number of sifts
//! - **No hidden allocation**: the tree allocates nothing; storage is
//!   pre-sized or grown by the caller
//! - **Shared storage**: one pool can feed several trees, and a node can
//!   move between them without being copied
//!
//! # Positions
//!
//! The tree is complete, so every node has a 1-based position in level
//! order, exactly as in an array heap. The binary digits of a position
//! after its leading 1 bit are the left/right steps from the root (see
//! [`Path`]). Insertion walks to position `len + 1`, deletion pulls the node
//! at position `len`, and iteration walks positions `1..=len`.
//!
//! # Quick Start
//!
//! ```
//! use nexus_heaptree::{BoxedHeapStorage, HeapNode, HeapTree};
//!
//! let mut storage: BoxedHeapStorage<u64> = BoxedHeapStorage::with_capacity(1000);
//! let mut heap: HeapTree<HeapNode<u64>, BoxedHeapStorage<u64>> = HeapTree::new();
//!
//! heap.try_push(&mut storage, 30).unwrap();
//! let key = heap.try_push(&mut storage, 20).unwrap();
//! heap.try_push(&mut storage, 10).unwrap();
//!
//! // O(log n) removal from anywhere
//! assert_eq!(heap.remove(&mut storage, key), Some(20));
//! assert_eq!(heap.pop(&mut storage), Some(10));
//! ```
//!
//! # Moving Between Trees
//!
//! `unlink` and `link` move a node without touching its storage slot.
//!
//! ```
//! use nexus_heaptree::{BoxedHeapStorage, HeapNode, HeapTree};
//!
//! let mut storage: BoxedHeapStorage<u64> = BoxedHeapStorage::with_capacity(16);
//! let mut pending: HeapTree<HeapNode<u64>, BoxedHeapStorage<u64>> = HeapTree::new();
//! let mut ready: HeapTree<HeapNode<u64>, BoxedHeapStorage<u64>> = HeapTree::new();
//!
//! let key = pending.try_push(&mut storage, 42).unwrap();
//!
//! assert!(pending.unlink(&mut storage, key));
//! ready.link(&mut storage, key);
//!
//! assert!(pending.is_empty());
//! assert_eq!(ready.peek_value(&storage), Some(&42));
//! ```
//!
//! # Critical Invariant: Same Storage Instance
//!
//! All operations on a tree must use the same storage instance. This is the
//! caller's responsibility (same discipline as the `slab` crate). Passing a
//! different storage causes undefined behavior.
//!
//! # Storage Traits
//!
//! ```text
//! Storage<T>           - base trait: get, remove
//!     │
//!     ├── BoundedStorage<T>   - fixed capacity, try_insert -> Result
//!     │
//!     └── UnboundedStorage<T> - growable, insert -> Key (infallible)
//! ```
//!
//! - `try_push` for bounded storage (returns `Result<K, Full<T>>`)
//! - `push` for unbounded storage (returns `K`, infallible)
//!
//! # Feature Flags
//!
//! - `slab` - Enable [`Storage`] impl for `slab::Slab`
//! - `cli` - Build the `heaptree-selftest` and `heaptree-bench` drivers

#![warn(missing_docs)]

pub mod error;
pub mod iter;
pub mod key;
pub mod link;
pub mod owned;
pub mod path;
pub mod storage;
pub mod tree;

pub use error::{LinkError, TreeError};
pub use iter::{Iter, Keys};
pub use key::Key;
pub use link::{HeapLink, HeapNode, LinkState, Linked};
pub use owned::OwnedHeapTree;
pub use path::{Direction, Path, Side, Slot};
pub use storage::{BoundedStorage, BoxedStorage, Full, Storage, UnboundedStorage};
pub use tree::{BoxedHeapStorage, HeapTree};

#[cfg(feature = "slab")]
pub use tree::SlabHeapStorage;
