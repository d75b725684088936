//! Runtime Hooks
//!
//! Managed runtimes give a harness a GC hint, a heap probe and an
//! optimization-tier query. On a static-compile target those become
//! allocator-backed probes and no-ops; embedding runtimes implement the
//! trait to expose the real thing.

use crate::heap;

/// Hooks into the runtime hosting the benchmarked code.
pub trait RuntimeHooks {
    /// Suggest a collection point. No-op on the native runtime.
    fn gc_hint(&mut self) {}

    /// Used-heap bytes right now.
    fn heap_used(&self) -> u64 {
        0
    }

    /// Optimization-tier code for the benchmarked callable, when the
    /// runtime exposes one. `None` means "no tier concept".
    fn opt_status(&self) -> Option<i8> {
        None
    }

    /// Take the heap-sampling profile accumulated so far, if the runtime
    /// collected one. The profile is opaque JSON; flattening is the
    /// consumer's concern.
    fn take_heap_profile(&mut self) -> Option<String> {
        None
    }
}

/// Hooks for plain native code: heap usage comes from the tracking
/// allocator, everything else is absent.
#[derive(Debug, Default)]
pub struct NativeRuntime;

impl RuntimeHooks for NativeRuntime {
    fn heap_used(&self) -> u64 {
        heap::heap_used()
    }
}
