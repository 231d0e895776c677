//! The contiguous memory region heap objects are carved from.
//!
//! The whole maximum heap is reserved up front with an anonymous private mapping, so the
//! arena never moves. Pages are only backed by the OS once they are touched.

use std::ptr::NonNull;

use libc::{c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE};
use libc::{PROT_READ, PROT_WRITE};

use crate::failure::Fault;
use crate::value::WORD_SIZE;

pub struct Arena {
    base: NonNull<usize>,
    words: usize,
}

impl Arena {
    /// Reserves `words` zeroed machine words.
    pub fn reserve(words: usize) -> Result<Arena, Fault> {
        let bytes = words
            .checked_mul(WORD_SIZE)
            .filter(|bytes| *bytes > 0)
            .ok_or_else(|| Fault::Arena(format!("cannot reserve {words} words")))?;

        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                bytes,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
                -1,
                0,
            )
        };

        if ptr == MAP_FAILED {
            return Err(Fault::Arena(std::io::Error::last_os_error().to_string()));
        }

        let base = NonNull::new(ptr as *mut usize)
            .ok_or_else(|| Fault::Arena("mmap returned a null mapping".into()))?;

        Ok(Arena { base, words })
    }

    #[inline(always)]
    pub fn base(&self) -> *mut usize {
        self.base.as_ptr()
    }

    /// Capacity in words.
    #[inline(always)]
    pub fn words(&self) -> usize {
        self.words
    }

    /// Address of the word at `index`.
    #[inline(always)]
    pub fn addr_of(&self, index: usize) -> usize {
        self.base.as_ptr() as usize + index * WORD_SIZE
    }

    /// Index of the word containing `addr`, if it lies inside the first `limit` words.
    #[inline(always)]
    pub fn index_of(&self, addr: usize, limit: usize) -> Option<usize> {
        let start = self.base.as_ptr() as usize;
        let offset = addr.checked_sub(start)?;
        let index = offset / WORD_SIZE;
        (index < limit).then_some(index)
    }

    /// # Safety
    /// `index` must be inside the arena.
    #[inline(always)]
    pub unsafe fn word(&self, index: usize) -> usize {
        debug_assert!(index < self.words);
        self.base.as_ptr().add(index).read()
    }

    /// # Safety
    /// `index` must be inside the arena.
    #[inline(always)]
    pub unsafe fn set_word(&mut self, index: usize, word: usize) {
        debug_assert!(index < self.words);
        self.base.as_ptr().add(index).write(word)
    }

    /// Zeroes the words in `from..to`.
    pub fn clear(&mut self, from: usize, to: usize) {
        debug_assert!(from <= to && to <= self.words);
        unsafe { self.base.as_ptr().add(from).write_bytes(0, to - from) }
    }

    /// Moves `count` words from `from` down to `to`. The ranges may overlap.
    ///
    /// # Safety
    /// Both ranges must be inside the arena.
    pub unsafe fn slide(&mut self, from: usize, to: usize, count: usize) {
        debug_assert!(from + count <= self.words && to + count <= self.words);
        let base = self.base.as_ptr();
        std::ptr::copy(base.add(from), base.add(to), count);
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe {
            munmap(self.base.as_ptr() as *mut c_void, self.words * WORD_SIZE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_is_zeroed() {
        let arena = Arena::reserve(1024).unwrap();
        assert_eq!(arena.words(), 1024);
        assert!((0..1024).all(|i| unsafe { arena.word(i) } == 0));
        assert_eq!(arena.base() as usize % WORD_SIZE, 0);
    }

    #[test]
    fn test_index_of() {
        let arena = Arena::reserve(16).unwrap();
        let addr = arena.addr_of(3);
        assert_eq!(arena.index_of(addr, 16), Some(3));
        assert_eq!(arena.index_of(addr + 1, 16), Some(3));
        assert_eq!(arena.index_of(addr, 3), None);
        assert_eq!(arena.index_of(arena.base() as usize - WORD_SIZE, 16), None);
    }

    #[test]
    fn test_slide_and_clear() {
        let mut arena = Arena::reserve(8).unwrap();
        unsafe {
            for i in 0..4 {
                arena.set_word(4 + i, i + 10);
            }
            arena.slide(4, 1, 4);
            assert_eq!(arena.word(1), 10);
            assert_eq!(arena.word(4), 13);
        }
        arena.clear(5, 8);
        assert_eq!(unsafe { arena.word(5) }, 0);
    }

    #[test]
    fn test_zero_words_is_rejected() {
        assert!(matches!(Arena::reserve(0), Err(Fault::Arena(_))));
    }
}
