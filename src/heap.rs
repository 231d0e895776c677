//! The managed heap: a bump allocator over an [Arena], plus the checked [ObjRef] handles that
//! every other module uses to look at objects.
//!
//! Objects are laid out back to back from the bottom of the arena:
//!
//! ```txt
//! | header | payload ... | header | payload ... | ... top ... limit ... capacity |
//!          ^ Value points here
//! ```

use std::fmt::Debug;

use crate::arena::Arena;
use crate::failure::{fail, Fault};
use crate::header::{Header, Kind, HEADER_SIZE};
use crate::objmap::StartMap;
use crate::value::{Value, WORD_SIZE};

/// Bounds of the allocated part of the heap. A Value into it lies in `(start, end]`: it never
/// addresses the first header, and the payload of an empty object at the top is `end` itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapRange {
    pub start: usize,
    pub end: usize,
}

impl HeapRange {
    #[inline(always)]
    pub fn contains(&self, addr: usize) -> bool {
        addr > self.start && addr <= self.end
    }
}

pub struct Heap {
    arena: Arena,
    starts: StartMap,
    /// First free word.
    top: usize,
    /// Allocation stops here until the collector grows it.
    limit: usize,
}

impl Heap {
    pub fn new(initial_words: usize, max_words: usize) -> Result<Heap, Fault> {
        let arena = Arena::reserve(max_words)?;
        let limit = initial_words.min(max_words);
        Ok(Heap {
            arena,
            starts: StartMap::with_words(limit),
            top: 0,
            limit,
        })
    }

    /// Words in use, garbage included.
    #[inline]
    pub fn used(&self) -> usize {
        self.top
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.words()
    }

    #[inline]
    pub fn range(&self) -> HeapRange {
        HeapRange {
            start: self.arena.addr_of(0),
            end: self.arena.addr_of(self.top),
        }
    }

    /// Raises the soft limit to `words`, clamped to the arena capacity.
    pub fn grow_limit(&mut self, words: usize) -> usize {
        let limit = words.min(self.capacity()).max(self.limit);
        if limit != self.limit {
            tracing::debug!(from = self.limit, to = limit, "heap limit grown");
            self.limit = limit;
            self.starts.ensure(limit);
        }
        limit
    }

    /// Carves a zeroed object with a written header. Returns the header index, or `None` when
    /// the soft limit is reached.
    pub fn try_alloc(&mut self, kind: Kind, len: usize) -> Option<usize> {
        let words = kind.words(len);
        let end = self.top.checked_add(words)?;
        if end > self.limit {
            return None;
        }

        let index = self.top;
        self.arena.clear(index, end);
        unsafe { self.arena.set_word(index, Header::new(kind, len).raw()) };
        self.starts.set(index);
        self.top = end;

        Some(index)
    }

    #[inline]
    pub fn header(&self, index: usize) -> Header {
        Header::from_raw(unsafe { self.arena.word(index) })
    }

    /// Header and kind of the object at `index`, failing on a corrupted tag.
    pub fn decode(&self, index: usize) -> (Header, Kind) {
        let header = self.header(index);
        match header.kind() {
            Some(kind) => (header, kind),
            None => fail(Fault::UnknownHeaderTag {
                tag: header.tag_bits(),
                addr: self.arena.addr_of(index),
            }),
        }
    }

    #[inline]
    pub fn payload_addr(&self, index: usize) -> usize {
        self.arena.addr_of(index + 1)
    }

    /// Resolves a Value to the object whose payload it addresses exactly.
    pub fn object(&self, value: Value) -> Option<ObjRef<'_>> {
        let index = self.header_index(value)?;
        Some(ObjRef { heap: self, index })
    }

    /// Header index of the object whose payload `value` addresses exactly.
    pub fn header_index(&self, value: Value) -> Option<usize> {
        if !value.is_pointer_shaped() {
            return None;
        }
        // Through the header word: an empty object has no payload word of its own.
        let index = self.arena.index_of(value.raw() - HEADER_SIZE, self.top)?;
        self.starts.is_start(index).then_some(index)
    }

    /// Header index of the object a payload or interior pointer `addr` refers to. Resolved
    /// through the word before `addr`, so the payload of an empty object finds its own header.
    pub fn containing(&self, addr: usize) -> Option<usize> {
        let word = self.arena.index_of(addr.checked_sub(1)?, self.top)?;
        self.starts.start_at_or_before(word)
    }

    /// # Safety
    /// `index` must be below [Heap::used].
    #[inline]
    pub(crate) unsafe fn word(&self, index: usize) -> usize {
        self.arena.word(index)
    }

    /// # Safety
    /// `index` must be below [Heap::used].
    #[inline]
    pub(crate) unsafe fn set_word(&mut self, index: usize, word: usize) {
        self.arena.set_word(index, word)
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub(crate) fn starts_mut(&mut self) -> &mut StartMap {
        &mut self.starts
    }

    /// Moves the bump pointer down after compaction and zeroes what was released.
    pub(crate) fn truncate(&mut self, top: usize) {
        debug_assert!(top <= self.top);
        self.arena.clear(top, self.top);
        self.top = top;
    }
}

/// A checked handle to a live heap object. It borrows the heap, so it cannot outlive the next
/// allocation or collection, which may move the object.
#[derive(Clone, Copy)]
pub struct ObjRef<'h> {
    heap: &'h Heap,
    index: usize,
}

impl<'h> ObjRef<'h> {
    #[inline]
    pub fn header(&self) -> Header {
        self.heap.header(self.index)
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.heap.decode(self.index).1
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.header().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Header index inside the arena.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The Value that refers to this object.
    #[inline]
    pub fn value(&self) -> Value {
        Value::from_raw(self.heap.payload_addr(self.index))
    }

    /// Raw payload word `slot`.
    #[inline]
    pub fn slot(&self, slot: usize) -> usize {
        debug_assert!(self.index + 1 + slot < self.heap.used());
        unsafe { self.heap.word(self.index + 1 + slot) }
    }

    /// The bytes of a string object, without the trailing NUL.
    pub fn bytes(&self) -> &'h [u8] {
        debug_assert_eq!(self.kind(), Kind::String);
        let ptr = self.heap.payload_addr(self.index) as *const u8;
        unsafe { std::slice::from_raw_parts(ptr, self.len()) }
    }

    /// The element values of an array, the sub-terms of a sexp or the captures of a closure.
    pub fn fields(&self) -> impl Iterator<Item = Value> + 'h {
        let this = *self;
        self.kind()
            .traced_slots(self.len())
            .map(move |slot| Value::from_raw(this.slot(slot)))
    }

    /// Constructor tag of a sexp.
    #[inline]
    pub fn sexp_tag(&self) -> usize {
        debug_assert_eq!(self.kind(), Kind::Sexp);
        self.slot(0)
    }

    /// Entry address of a closure.
    #[inline]
    pub fn code(&self) -> usize {
        debug_assert_eq!(self.kind(), Kind::Closure);
        self.slot(0)
    }
}

impl Debug for ObjRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjRef")
            .field("addr", &format_args!("{:#x}", self.value().raw()))
            .field("header", &self.header())
            .finish()
    }
}

impl Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("base", &format_args!("{:#x}", self.arena.addr_of(0)))
            .field("used", &self.top)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Bytes a word count stands for, for logging.
#[inline]
pub fn words_to_bytes(words: usize) -> usize {
    words * WORD_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_writes_header() {
        let mut heap = Heap::new(64, 64).unwrap();
        let index = heap.try_alloc(Kind::Array, 3).unwrap();
        assert_eq!(index, 0);
        assert_eq!(heap.used(), 4);

        let value = Value::from_raw(heap.payload_addr(index));
        let obj = heap.object(value).unwrap();
        assert_eq!(obj.kind(), Kind::Array);
        assert_eq!(obj.len(), 3);
        assert!(obj.fields().all(|v| v.raw() == 0));
    }

    #[test]
    fn test_alloc_stops_at_limit() {
        let mut heap = Heap::new(8, 16).unwrap();
        assert!(heap.try_alloc(Kind::Array, 7).is_some());
        assert!(heap.try_alloc(Kind::Array, 0).is_none());

        heap.grow_limit(16);
        assert_eq!(heap.limit(), 16);
        assert!(heap.try_alloc(Kind::Array, 7).is_some());
        assert!(heap.try_alloc(Kind::Array, 0).is_none());

        // Never past the reservation.
        assert_eq!(heap.grow_limit(1024), 16);
    }

    #[test]
    fn test_object_requires_exact_payload() {
        let mut heap = Heap::new(64, 64).unwrap();
        let index = heap.try_alloc(Kind::Array, 2).unwrap();
        let payload = heap.payload_addr(index);

        assert!(heap.object(Value::from_raw(payload)).is_some());
        assert!(heap.object(Value::from_raw(payload + WORD_SIZE)).is_none());
        assert!(heap.object(Value::from_raw(payload - WORD_SIZE)).is_none());
        assert!(heap.object(Value::int(3)).is_none());

        let outside = 0usize;
        assert!(heap.object(Value::from_ptr(&outside as *const usize)).is_none());
    }

    #[test]
    fn test_containing_resolves_interior() {
        let mut heap = Heap::new(64, 64).unwrap();
        let first = heap.try_alloc(Kind::Array, 2).unwrap();
        let second = heap.try_alloc(Kind::Sexp, 3).unwrap();

        let inside_second = heap.payload_addr(second) + 2 * WORD_SIZE;
        assert_eq!(heap.containing(inside_second), Some(second));
        assert_eq!(heap.containing(heap.payload_addr(first)), Some(first));
        assert_eq!(heap.containing(heap.range().start), None);
        assert_eq!(heap.containing(heap.range().end + WORD_SIZE), None);
    }

    #[test]
    fn test_empty_objects_resolve() {
        let mut heap = Heap::new(64, 64).unwrap();
        let below = heap.try_alloc(Kind::Array, 0).unwrap();
        let string = heap.try_alloc(Kind::String, 3).unwrap();
        let top = heap.try_alloc(Kind::Array, 0).unwrap();

        // The payload of `below` is the header address of `string`.
        let below_value = Value::from_raw(heap.payload_addr(below));
        assert_eq!(heap.header_index(below_value), Some(below));
        assert_eq!(heap.containing(below_value.raw()), Some(below));
        assert_eq!(heap.object(below_value).unwrap().kind(), Kind::Array);

        let top_value = Value::from_raw(heap.payload_addr(top));
        assert_eq!(top_value.raw(), heap.range().end);
        assert!(heap.range().contains(top_value.raw()));
        let obj = heap.object(top_value).unwrap();
        assert_eq!((obj.kind(), obj.len()), (Kind::Array, 0));
        assert_eq!(heap.containing(top_value.raw()), Some(top));

        assert_eq!(heap.containing(heap.payload_addr(string)), Some(string));
    }

    #[test]
    fn test_string_bytes() {
        let mut heap = Heap::new(64, 64).unwrap();
        let index = heap.try_alloc(Kind::String, 5).unwrap();
        let payload = heap.payload_addr(index) as *mut u8;
        unsafe { payload.copy_from_nonoverlapping(b"hello".as_ptr(), 5) };

        let obj = heap.object(Value::from_raw(payload as usize)).unwrap();
        assert_eq!(obj.bytes(), b"hello");
        // Terminator is in place.
        assert_eq!(unsafe { payload.add(5).read() }, 0);
    }
}
