//! The one-word header that precedes every heap object payload.
//!
//! ```txt
//!  63                                 4   3   2  0
//! +------------------------------------+---+-----+
//! |              length                | m | tag |
//! +------------------------------------+---+-----+
//! ```
//!
//! The tag says which [Kind] of object follows, `m` is the mark bit used only while a
//! collection is running, and the remaining 60 bits (28 on 32 bit targets) hold the payload
//! length: bytes for strings, slots for everything else.

use std::fmt::Debug;

use crate::value::WORD_SIZE;

pub const TAG_MASK: usize = 0b111;
pub const MARK_BIT: usize = 0b1000;
pub const LEN_SHIFT: u32 = 4;

/// Largest length a header can record.
pub const MAX_LEN: usize = usize::MAX >> LEN_SHIFT;

/// Size of the header in bytes. The header of a payload at `p` lives at `p - HEADER_SIZE`.
pub const HEADER_SIZE: usize = WORD_SIZE;

/// The kind of a heap object. The discriminants are odd so that a header word can never be
/// confused with a pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    String = 0b001,
    Array = 0b011,
    Sexp = 0b101,
    Closure = 0b111,
}

impl Kind {
    #[inline]
    pub const fn from_bits(bits: usize) -> Option<Kind> {
        match bits & TAG_MASK {
            0b001 => Some(Kind::String),
            0b011 => Some(Kind::Array),
            0b101 => Some(Kind::Sexp),
            0b111 => Some(Kind::Closure),
            _ => None,
        }
    }

    /// Number of words an object of this kind and length occupies, header included.
    #[inline]
    pub const fn words(self, len: usize) -> usize {
        1 + match self {
            // Room for the trailing NUL so the payload reads as a C string.
            Kind::String => (len + 1 + WORD_SIZE - 1) / WORD_SIZE,
            Kind::Array => len,
            Kind::Sexp => len + 1,
            Kind::Closure => len,
        }
    }

    /// Payload slots that hold Values the collector must follow.
    #[inline]
    pub const fn traced_slots(self, len: usize) -> std::ops::Range<usize> {
        match self {
            Kind::String => 0..0,
            Kind::Array => 0..len,
            // Slot 0 holds the constructor tag.
            Kind::Sexp => 1..len + 1,
            // Slot 0 holds the code pointer.
            Kind::Closure => 1..len,
        }
    }
}

/// A decoded header word.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Header(usize);

impl Header {
    #[inline]
    pub const fn new(kind: Kind, len: usize) -> Self {
        Self((len << LEN_SHIFT) | kind as usize)
    }

    #[inline]
    pub const fn from_raw(word: usize) -> Self {
        Self(word)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// The object kind, or `None` if the tag bits are not a known kind.
    #[inline]
    pub const fn kind(self) -> Option<Kind> {
        Kind::from_bits(self.0)
    }

    #[inline]
    pub const fn tag_bits(self) -> usize {
        self.0 & TAG_MASK
    }

    #[inline]
    pub const fn len(self) -> usize {
        self.0 >> LEN_SHIFT
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn is_marked(self) -> bool {
        self.0 & MARK_BIT != 0
    }

    #[inline]
    pub const fn marked(self) -> Self {
        Self(self.0 | MARK_BIT)
    }

    #[inline]
    pub const fn unmarked(self) -> Self {
        Self(self.0 & !MARK_BIT)
    }
}

impl Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Header")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .field("marked", &self.is_marked())
            .finish()
    }
}
