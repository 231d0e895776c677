//! The runtime context. Everything the collector can see hangs off a [Runtime]: the heap, the
//! root set and the collection statistics. Compiled code reaches it through [crate::ffi], which
//! keeps one per thread; Rust embedders own it directly.

use crate::config::RuntimeConfig;
use crate::failure::{self, fail, Fault};
use crate::gc::{Collector, GcStats, Phase};
use crate::header::{Kind, MAX_LEN};
use crate::heap::{Heap, ObjRef};
use crate::roots::{RootRange, RootSet, RootWindow};
use crate::value::Value;

pub struct Runtime {
    heap: Heap,
    roots: RootSet,
    config: RuntimeConfig,
    stats: GcStats,
    phase: Phase,
}

impl Runtime {
    /// Creates a runtime and installs its failure mode for the process.
    pub fn try_new(config: RuntimeConfig) -> Result<Runtime, Fault> {
        config.validate()?;
        failure::set_mode(config.failure_mode);

        let heap = Heap::new(config.initial_heap_words, config.max_heap_words)?;
        tracing::trace!(?heap, "runtime created");

        Ok(Runtime {
            heap,
            roots: RootSet::default(),
            config,
            stats: GcStats::default(),
            phase: Phase::Idle,
        })
    }

    /// Like [Runtime::try_new], but a bad configuration or an unmappable arena is fatal.
    pub fn new(config: RuntimeConfig) -> Runtime {
        Self::try_new(config).unwrap_or_else(|fault| fail(fault))
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Resolves a Value to the object it points at.
    pub fn object(&self, value: Value) -> Option<ObjRef<'_>> {
        self.heap.object(value)
    }

    pub fn stack_window(&self) -> RootWindow {
        self.roots.window()
    }

    /// Publishes the live span of the mutator stack.
    ///
    /// # Safety
    /// The window must stay readable and writable until it is replaced. Every word in it is
    /// scanned, and rewritten when it looks like a pointer into the heap.
    pub unsafe fn set_stack_window(&mut self, window: RootWindow) {
        self.roots.set_window(window);
    }

    /// Registers `len` Value slots starting at `start`, typically the globals of a program.
    ///
    /// # Safety
    /// The slots must stay valid for the lifetime of the runtime.
    pub unsafe fn register_static_roots(&mut self, start: *mut Value, len: usize) {
        self.roots.add_static(RootRange { start, len });
    }

    /// # Safety
    /// `slot` must stay valid until it is popped.
    pub unsafe fn push_extra_root(&mut self, slot: *mut Value) {
        self.roots.push_extra(slot);
    }

    pub fn pop_extra_root(&mut self, slot: *mut Value) {
        self.roots.pop_extra(slot);
    }

    /// Runs a full collection now.
    pub fn collect(&mut self) {
        if self.phase != Phase::Idle {
            fail(Fault::ReentrantAllocation);
        }
        let report = unsafe { Collector::new(&mut self.heap).run(&self.roots, &mut self.phase) };
        self.stats.record(report);
    }

    /// Allocates an object, collecting and growing the heap as needed. Returns the header
    /// index. The payload is zeroed; nothing allocated before this call may be assumed to stay
    /// where it was unless it is rooted.
    pub(crate) fn allocate(&mut self, kind: Kind, len: usize) -> usize {
        if self.phase != Phase::Idle {
            fail(Fault::ReentrantAllocation);
        }
        if len > MAX_LEN {
            fail(Fault::InvalidLength {
                op: "allocate",
                len: len as isize,
            });
        }

        if let Some(index) = self.heap.try_alloc(kind, len) {
            return index;
        }

        let words = kind.words(len);
        self.collect();
        self.ensure_headroom(words);

        match self.heap.try_alloc(kind, len) {
            Some(index) => index,
            None => fail(Fault::OutOfMemory {
                requested: words,
                live: self.heap.used(),
                capacity: self.heap.capacity(),
            }),
        }
    }

    /// Allocates while the Values in `args` are registered as roots, so they are kept and
    /// relocated if the allocation collects.
    ///
    /// # Safety
    /// `args` must point at `len` readable and writable Values.
    pub(crate) unsafe fn allocate_rooted(
        &mut self,
        kind: Kind,
        len: usize,
        args: *mut Value,
        count: usize,
    ) -> usize {
        self.roots.push_temporary(RootRange {
            start: args,
            len: count,
        });
        let index = self.allocate(kind, len);
        self.roots.pop_temporary();
        index
    }

    /// Grows the soft limit so that, with the pending request, at least `min_free_ratio` of it
    /// stays free.
    fn ensure_headroom(&mut self, words: usize) {
        let ratio = self.config.min_free_ratio.clamp(0.0, 0.9);
        let needed = self.heap.used().saturating_add(words);
        let limit = self.heap.limit();
        let free = limit.saturating_sub(needed);

        if needed > limit || (free as f64) < limit as f64 * ratio {
            let target = (needed as f64 / (1.0 - ratio)).ceil() as usize;
            self.heap.grow_limit(target.max(needed));
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        tracing::trace!(collections = self.stats.collections, "runtime torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureMode;

    fn runtime(words: usize) -> Runtime {
        Runtime::new(RuntimeConfig::fixed(words).with_failure_mode(FailureMode::Panic))
    }

    #[test]
    fn test_allocate_collects_garbage() {
        let mut rt = runtime(16);
        for _ in 0..10 {
            rt.allocate(Kind::Array, 3);
        }
        assert!(rt.stats().collections >= 2);
        assert!(rt.heap().used() <= 16);
    }

    #[test]
    fn test_heap_grows_under_pressure() {
        let config = RuntimeConfig {
            initial_heap_words: 8,
            max_heap_words: 1024,
            ..RuntimeConfig::default()
        }
        .with_failure_mode(FailureMode::Panic);
        let mut rt = Runtime::new(config);

        let mut kept = vec![Value::FALSE; 16];
        unsafe { rt.register_static_roots(kept.as_mut_ptr(), kept.len()) };
        for slot in 0..kept.len() {
            let index = rt.allocate(Kind::Array, 1);
            kept[slot] = Value::from_raw(rt.heap().payload_addr(index));
        }

        assert!(rt.heap().limit() > 8);
        assert_eq!(rt.heap().used(), 32);
        assert!(kept.iter().all(|value| rt.object(*value).is_some()));
    }

    #[test]
    fn test_extra_roots() {
        let mut rt = runtime(64);
        let index = rt.allocate(Kind::Array, 2);
        let mut slot = Value::from_raw(rt.heap().payload_addr(index));

        unsafe { rt.push_extra_root(&mut slot) };
        rt.collect();
        assert!(rt.object(slot).is_some());

        rt.pop_extra_root(&mut slot);
        rt.collect();
        assert_eq!(rt.heap().used(), 0);
        assert_eq!(rt.stats().last_reclaimed, 3);
    }

    #[test]
    #[should_panic(expected = "allocation requested while the collector is running")]
    fn test_allocation_during_collection_is_fatal() {
        let mut rt = runtime(64);
        rt.phase = Phase::Marking;
        rt.allocate(Kind::Array, 1);
    }

    #[test]
    #[should_panic(expected = "allocation requested while the collector is running")]
    fn test_collection_during_collection_is_fatal() {
        let mut rt = runtime(64);
        rt.phase = Phase::Relocating;
        rt.collect();
    }

    #[test]
    #[should_panic(expected = "out of memory")]
    fn test_out_of_memory() {
        let mut rt = runtime(8);
        rt.allocate(Kind::Array, 100);
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = RuntimeConfig {
            initial_heap_words: 10,
            max_heap_words: 5,
            ..RuntimeConfig::default()
        };
        assert!(matches!(Runtime::try_new(config), Err(Fault::Config(_))));
    }
}
