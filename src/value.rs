//! This module describes the values that the lama runtime manipulates. A [Value] is a single
//! machine word: integers are stored unboxed with the lowest bit set, everything else is a
//! word-aligned pointer to the payload of a heap object, so the lowest bit is always clear.

use std::fmt::{Debug, Display};

/// Size of a machine word in bytes. Every heap object is a whole number of words.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// The reserved bit that distinguishes unboxed integers from pointers.
pub const UNBOXED_BIT: usize = 0b1;

/// Smallest integer that survives boxing.
pub const MIN_UNBOXED: isize = isize::MIN >> 1;

/// Largest integer that survives boxing.
pub const MAX_UNBOXED: isize = isize::MAX >> 1;

/// A pointer tagged value. It has the same layout as the `aint` word compiled code passes
/// around, so it can cross the C boundary unchanged.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(usize);

/// Classifies a raw word.
#[inline(always)]
pub const fn is_unboxed(word: usize) -> bool {
    word & UNBOXED_BIT == UNBOXED_BIT
}

/// Encodes a native integer as an unboxed word. The top bit of `n` is lost.
#[inline(always)]
pub const fn box_int(n: isize) -> usize {
    ((n << 1) as usize) | UNBOXED_BIT
}

/// Decodes an unboxed word back into a native integer.
#[inline(always)]
pub const fn unbox_int(word: usize) -> isize {
    (word as isize) >> 1
}

impl Value {
    /// The unboxed zero, also used as `false`.
    pub const FALSE: Value = Value::int(0);

    /// The unboxed one, used as `true`.
    pub const TRUE: Value = Value::int(1);

    #[inline(always)]
    pub const fn from_raw(word: usize) -> Self {
        Self(word)
    }

    #[inline(always)]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Creates an unboxed integer value.
    #[inline(always)]
    pub const fn int(n: isize) -> Self {
        Self(box_int(n))
    }

    /// Creates a value that points at an object payload.
    #[inline(always)]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        debug_assert!(ptr as usize % WORD_SIZE == 0, "unaligned payload pointer");
        Self(ptr as usize)
    }

    #[inline(always)]
    pub const fn bool(b: bool) -> Self {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    #[inline(always)]
    pub const fn is_unboxed(self) -> bool {
        is_unboxed(self.0)
    }

    /// True when the word has the shape of a heap pointer: the reserved bit is clear and the
    /// address is word aligned. Says nothing about whether it points into a heap.
    #[inline(always)]
    pub const fn is_pointer_shaped(self) -> bool {
        self.0 % WORD_SIZE == 0 && self.0 != 0
    }

    /// Reads the integer of an unboxed value. Boxed values are decoded bitwise as well, which
    /// is what compiled code expects from `UNBOX`.
    #[inline(always)]
    pub const fn as_int(self) -> isize {
        unbox_int(self.0)
    }

    #[inline(always)]
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::FALSE
    }
}

impl From<isize> for Value {
    fn from(n: isize) -> Self {
        Value::int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unboxed() {
            write!(f, "Int({})", self.as_int())
        } else {
            write!(f, "Ptr({:#x})", self.0)
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unboxed() {
            write!(f, "{}", self.as_int())
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}
