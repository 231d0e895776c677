//! Mark-compact garbage collector.
//!
//! A collection is a single stop-the-world pause made of four passes over the arena:
//!
//! 1. mark everything reachable from the roots, setting the mark bit in each header;
//! 2. walk the arena in address order and give every marked object its compacted position;
//! 3. rewrite every root slot and every field of a marked object to the new positions;
//! 4. slide the marked objects down, clear their mark bits and rebuild the start map.
//!
//! Pointers are resolved through the start map, so a root that points into the middle of an
//! object keeps that object alive and keeps its offset when the object moves.

use std::ptr::NonNull;
use std::time::Instant;

use fxhash::FxHashMap;

use crate::heap::{words_to_bytes, Heap};
use crate::roots::RootSet;
use crate::value::Value;

/// Where the collector is in a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Marking,
    Relocating,
}

/// Running totals across collections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    /// Words freed by the last collection.
    pub last_reclaimed: usize,
    /// Words still in use after the last collection.
    pub last_live: usize,
    pub total_reclaimed: usize,
}

impl GcStats {
    pub(crate) fn record(&mut self, report: Report) {
        self.collections += 1;
        self.last_reclaimed = report.reclaimed;
        self.last_live = report.live;
        self.total_reclaimed += report.reclaimed;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Report {
    pub live: usize,
    pub reclaimed: usize,
}

pub(crate) struct Collector<'a> {
    heap: &'a mut Heap,
    worklist: Vec<usize>,
    /// Old header index to new header index of every marked object.
    forward: FxHashMap<usize, usize>,
}

impl<'a> Collector<'a> {
    pub fn new(heap: &'a mut Heap) -> Self {
        Self {
            heap,
            worklist: Vec::new(),
            forward: FxHashMap::default(),
        }
    }

    /// Runs a full collection. `phase` follows the collector through it.
    ///
    /// # Safety
    /// Every slot registered in `roots` must be valid for reads and writes.
    pub unsafe fn run(mut self, roots: &RootSet, phase: &mut Phase) -> Report {
        let started = Instant::now();
        let used = self.heap.used();
        tracing::debug!(used, "collection started");

        *phase = Phase::Marking;
        let slots = roots.slots(self.heap.range());
        self.mark(&slots);

        *phase = Phase::Relocating;
        let live = self.compute_forwarding();
        self.update_roots(&slots);
        self.update_fields();
        self.relocate(live);

        *phase = Phase::Idle;

        let report = Report {
            live,
            reclaimed: used - live,
        };
        tracing::debug!(
            roots = slots.len(),
            live = report.live,
            reclaimed = report.reclaimed,
            reclaimed_bytes = words_to_bytes(report.reclaimed),
            elapsed = ?started.elapsed(),
            "collection finished"
        );
        report
    }

    fn mark(&mut self, slots: &[NonNull<Value>]) {
        for slot in slots {
            let value = unsafe { slot.as_ptr().read() };
            self.mark_value(value);
        }

        while let Some(index) = self.worklist.pop() {
            let (header, kind) = self.heap.decode(index);
            for slot in kind.traced_slots(header.len()) {
                let value = Value::from_raw(unsafe { self.heap.word(index + 1 + slot) });
                self.mark_value(value);
            }
        }
    }

    fn mark_value(&mut self, value: Value) {
        if !value.is_pointer_shaped() {
            return;
        }
        let Some(index) = self.heap.containing(value.raw()) else {
            return;
        };

        let header = self.heap.header(index);
        if !header.is_marked() {
            unsafe { self.heap.set_word(index, header.marked().raw()) };
            self.worklist.push(index);
        }
    }

    /// Assigns compacted positions in address order. Returns the words that stay live.
    fn compute_forwarding(&mut self) -> usize {
        let used = self.heap.used();
        let mut index = 0;
        let mut free = 0;

        while index < used {
            let (header, kind) = self.heap.decode(index);
            let words = kind.words(header.len());
            if header.is_marked() {
                self.forward.insert(index, free);
                free += words;
            }
            index += words;
        }

        free
    }

    /// New address for a word that points into a marked object.
    fn relocated(&self, value: Value) -> Option<usize> {
        if !value.is_pointer_shaped() {
            return None;
        }
        let index = self.heap.containing(value.raw())?;
        let target = *self.forward.get(&index)?;

        let arena = self.heap.arena();
        let offset = value.raw() - arena.addr_of(index);
        Some(arena.addr_of(target) + offset)
    }

    fn update_roots(&mut self, slots: &[NonNull<Value>]) {
        for slot in slots {
            let value = unsafe { slot.as_ptr().read() };
            if let Some(addr) = self.relocated(value) {
                unsafe { slot.as_ptr().write(Value::from_raw(addr)) };
            }
        }
    }

    fn update_fields(&mut self) {
        let used = self.heap.used();
        let mut index = 0;

        while index < used {
            let (header, kind) = self.heap.decode(index);
            if header.is_marked() {
                for slot in kind.traced_slots(header.len()) {
                    let at = index + 1 + slot;
                    let value = Value::from_raw(unsafe { self.heap.word(at) });
                    if let Some(addr) = self.relocated(value) {
                        unsafe { self.heap.set_word(at, addr) };
                    }
                }
            }
            index += kind.words(header.len());
        }
    }

    fn relocate(&mut self, live: usize) {
        let used = self.heap.used();
        self.heap.starts_mut().clear_all();

        let mut index = 0;
        let mut free = 0;
        while index < used {
            let (header, kind) = self.heap.decode(index);
            let words = kind.words(header.len());

            if header.is_marked() {
                debug_assert_eq!(self.forward.get(&index), Some(&free));
                unsafe {
                    self.heap.arena_mut().slide(index, free, words);
                    self.heap.set_word(free, header.unmarked().raw());
                }
                self.heap.starts_mut().set(free);
                free += words;
            }
            index += words;
        }

        debug_assert_eq!(free, live);
        self.heap.truncate(free);
    }
}
