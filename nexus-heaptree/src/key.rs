//! Key trait for node handles.
//!
//! Every relation inside a heap tree (`parent`, `left`, `right`, and the
//! tree's root) is a [`Key`] into host-owned storage. A reserved sentinel,
//! [`Key::NONE`], stands for "no relation" so links stay a single word wide.

use core::fmt::Debug;

/// Handle type used to refer to nodes in storage.
///
/// Provides a sentinel value (`NONE`) and conversion to/from `usize`.
/// Implemented for the unsigned integer types; custom handle types (for
/// example a strongly-typed timer id) can implement it too.
///
/// # Example
///
/// ```
/// use nexus_heaptree::Key;
///
/// let key: u32 = 7;
/// assert!(key.is_some());
/// assert!(u32::NONE.is_none());
/// assert_eq!(u32::from_usize(7), key);
/// ```
///
/// # Custom Key Types
///
/// ```
/// use nexus_heaptree::Key;
///
/// #[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// struct TimerId(u32);
///
/// impl Key for TimerId {
///     const NONE: Self = TimerId(u32::MAX);
///
///     fn from_usize(val: usize) -> Self {
///         TimerId(val as u32)
///     }
///
///     fn as_usize(&self) -> usize {
///         self.0 as usize
///     }
/// }
///
/// assert!(TimerId::NONE.is_none());
/// ```
pub trait Key: Copy + Eq + Debug {
    /// Sentinel value meaning "no node".
    ///
    /// For integer types this is `MAX`, which storage never hands out.
    const NONE: Self;

    /// Creates a key from a slot number.
    fn from_usize(val: usize) -> Self;

    /// Returns the slot number of this key.
    fn as_usize(&self) -> usize;

    /// Returns `true` if this is the sentinel value.
    #[inline]
    fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Returns `true` if this is NOT the sentinel value.
    #[inline]
    fn is_some(&self) -> bool {
        !self.is_none()
    }
}

macro_rules! impl_key_for_unsigned {
    ($($ty:ty),*) => {
        $(
            impl Key for $ty {
                const NONE: Self = <$ty>::MAX;

                #[inline]
                fn from_usize(val: usize) -> Self {
                    val as Self
                }

                #[inline]
                fn as_usize(&self) -> usize {
                    *self as usize
                }
            }
        )*
    };
}

impl_key_for_unsigned!(u8, u16, u32, u64, usize);
