//! Root discovery.
//!
//! Compiled code keeps its Values on the native stack and publishes the live span of it as the
//! root window. The collector cannot know which words in the window are Values, so the scan is
//! conservative: every pointer-shaped word that falls inside the heap is taken as a root, and
//! rewritten in place when the object it refers to moves.

use std::ptr::NonNull;

use crate::failure::{fail, Fault};
use crate::heap::HeapRange;
use crate::value::{Value, WORD_SIZE};

/// The live span of the native stack, `[low, high)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RootWindow {
    low: usize,
    high: usize,
}

impl RootWindow {
    pub const EMPTY: RootWindow = RootWindow { low: 0, high: 0 };

    /// Builds a window from the two tracked stack bounds, in whichever order the stack grows.
    pub fn from_bounds(bottom: usize, top: usize) -> Self {
        Self {
            low: bottom.min(top),
            high: bottom.max(top),
        }
    }

    pub fn from_slots(start: *mut Value, len: usize) -> Self {
        let low = start as usize;
        Self {
            low,
            high: low + len * WORD_SIZE,
        }
    }

    pub fn low(&self) -> usize {
        self.low
    }

    pub fn high(&self) -> usize {
        self.high
    }

    pub fn is_empty(&self) -> bool {
        self.low >= self.high
    }
}

/// Lazily walks a root window and yields the slots that hold heap pointers. It consumes itself,
/// a second pass needs a new scanner.
pub struct StackScanner {
    cursor: usize,
    end: usize,
    heap: HeapRange,
}

impl StackScanner {
    /// # Safety
    /// Every word of `window` must be readable for as long as the scanner and the slots it
    /// yields are used.
    pub unsafe fn new(window: RootWindow, heap: HeapRange) -> Self {
        // Slots are word aligned even if the bounds are not.
        let cursor = window.low.next_multiple_of(WORD_SIZE);
        Self {
            cursor,
            end: window.high,
            heap,
        }
    }
}

impl Iterator for StackScanner {
    type Item = NonNull<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor + WORD_SIZE <= self.end {
            let slot = self.cursor as *mut Value;
            self.cursor += WORD_SIZE;

            let value = unsafe { slot.read() };
            if value.is_pointer_shaped() && self.heap.contains(value.raw()) {
                return NonNull::new(slot);
            }
        }
        None
    }
}

/// A contiguous run of Value slots outside the heap that the collector must treat as roots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootRange {
    pub start: *mut Value,
    pub len: usize,
}

impl RootRange {
    pub fn window(&self) -> RootWindow {
        RootWindow::from_slots(self.start, self.len)
    }
}

/// Every source of roots besides the heap itself.
#[derive(Default)]
pub struct RootSet {
    window: RootWindow,
    statics: Vec<RootRange>,
    temporaries: Vec<RootRange>,
    extra: Vec<*mut Value>,
}

impl RootSet {
    pub fn window(&self) -> RootWindow {
        self.window
    }

    pub fn set_window(&mut self, window: RootWindow) {
        self.window = window;
    }

    pub fn add_static(&mut self, range: RootRange) {
        self.statics.push(range);
    }

    pub fn push_temporary(&mut self, range: RootRange) {
        self.temporaries.push(range);
    }

    pub fn pop_temporary(&mut self) {
        self.temporaries.pop();
    }

    pub fn push_extra(&mut self, slot: *mut Value) {
        self.extra.push(slot);
    }

    /// Removes the most recent registration of `slot`.
    pub fn pop_extra(&mut self, slot: *mut Value) {
        match self.extra.iter().rposition(|registered| *registered == slot) {
            Some(position) => {
                self.extra.remove(position);
            }
            None => fail(Fault::Message(format!(
                "pop_extra_root: {:#x} is not a registered root",
                slot as usize
            ))),
        }
    }

    /// Collects every slot that currently holds a heap pointer, each slot once.
    ///
    /// # Safety
    /// All registered ranges and slots must still be valid.
    pub unsafe fn slots(&self, heap: HeapRange) -> Vec<NonNull<Value>> {
        let mut slots: Vec<NonNull<Value>> = StackScanner::new(self.window, heap).collect();

        for range in self.statics.iter().chain(&self.temporaries) {
            slots.extend(StackScanner::new(range.window(), heap));
        }

        for slot in self.extra.iter().filter_map(|slot| NonNull::new(*slot)) {
            let value = slot.as_ptr().read();
            if value.is_pointer_shaped() && heap.contains(value.raw()) {
                slots.push(slot);
            }
        }

        // A slot seen twice would be relocated twice.
        slots.sort_unstable_by_key(|slot| slot.as_ptr() as usize);
        slots.dedup();
        slots
    }
}

/// A fixed-capacity stack of Values that lives outside the heap, for embedders that keep their
/// operand stack in Rust. Its bounds are handed to the runtime as the root window.
pub struct ShadowStack {
    base: NonNull<Value>,
    capacity: usize,
    len: usize,
}

impl ShadowStack {
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = vec![Value::FALSE; capacity.max(1)].into_boxed_slice();
        let capacity = slots.len();
        let base = NonNull::new(Box::into_raw(slots) as *mut Value)
            .unwrap_or_else(|| fail(Fault::Message("shadow stack allocation failed".into())));
        Self {
            base,
            capacity,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: Value) -> usize {
        if self.len == self.capacity {
            fail(Fault::Message(format!(
                "shadow stack overflow at {} slots",
                self.capacity
            )));
        }
        unsafe { self.base.as_ptr().add(self.len).write(value) };
        self.len += 1;
        self.len - 1
    }

    pub fn pop(&mut self) -> Option<Value> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        let value = unsafe { self.base.as_ptr().add(self.len).read() };
        unsafe { self.base.as_ptr().add(self.len).write(Value::FALSE) };
        Some(value)
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        (index < self.len).then(|| unsafe { self.base.as_ptr().add(index).read() })
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if index >= self.len {
            fail(Fault::IndexOutOfBounds {
                op: "shadow stack",
                index: index as isize,
                len: self.len,
            });
        }
        unsafe { self.base.as_ptr().add(index).write(value) };
    }

    /// The occupied part of the stack.
    pub fn window(&self) -> RootWindow {
        RootWindow::from_slots(self.base.as_ptr(), self.len)
    }
}

impl Drop for ShadowStack {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.base.as_ptr(),
                self.capacity,
            )));
        }
    }
}
