//! Heap Usage Tracking
//!
//! A wrapping global allocator that keeps a live-byte counter, backing the
//! per-sample `heap_samples` series and the amortized heap-growth figure.
//! Benchmark binaries opt in:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: pulsebench_core::TrackingAllocator = pulsebench_core::TrackingAllocator;
//! ```
//!
//! Without the allocator installed, [`heap_used`] reports 0 and heap
//! columns stay flat.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicI64, Ordering};

// Signed so that frees of allocations made before tracking started cannot
// wrap the counter.
static LIVE_BYTES: AtomicI64 = AtomicI64::new(0);

/// Global allocator wrapper that counts live bytes.
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            LIVE_BYTES.fetch_add(layout.size() as i64, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        LIVE_BYTES.fetch_sub(layout.size() as i64, Ordering::Relaxed);
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            LIVE_BYTES.fetch_add(layout.size() as i64, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            LIVE_BYTES.fetch_add(new_size as i64 - layout.size() as i64, Ordering::Relaxed);
        }
        new_ptr
    }
}

/// Currently live heap bytes, as seen by the tracking allocator.
pub fn heap_used() -> u64 {
    LIVE_BYTES.load(Ordering::Relaxed).max(0) as u64
}
