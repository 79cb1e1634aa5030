//! Per-thread context and SIMT-style lane collectives (component C).
//!
//! Grounded on `original_source/multicore-wasm/lib/thread_context.c`
//! (`_lane_sync`, `_lane_sync_u64`, `_lane_range`, `is_main_thread`, the
//! `tctx_thread_local` thread-local current-context pointer).

use crate::memory::Arena;
use crate::thread::Barrier;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A half-open range `[min, max)`, the output of [`ThreadContext::lane_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub min: u64,
    pub max: u64,
}

impl Range {
    pub fn len(&self) -> u64 {
        self.max - self.min
    }

    pub fn is_empty(&self) -> bool {
        self.min >= self.max
    }
}

/// Per-thread state shared by every lane operation (§3.2). One instance exists per
/// participant in a fixed thread group; `thread_idx == 0` is the main lane.
pub struct ThreadContext {
    pub thread_idx: u32,
    pub thread_count: u32,
    barrier: Barrier,
    /// The single shared `u64` slot used by `lane_sync_u64`. Shared by every
    /// participant of the group (§5's "written by at most one lane between two
    /// `lane_sync` calls" contract).
    broadcast_memory: Arc<AtomicU64>,
    pub temp_arena: Arena,
}

impl ThreadContext {
    pub fn new(thread_idx: u32, thread_count: u32, barrier: Barrier, broadcast_memory: Arc<AtomicU64>, temp_arena: Arena) -> ThreadContext {
        ThreadContext {
            thread_idx,
            thread_count,
            barrier,
            broadcast_memory,
            temp_arena,
        }
    }

    pub fn is_main_thread(&self) -> bool {
        self.thread_idx == 0
    }

    /// Barrier wait: every write performed before this call by any lane is visible to
    /// every lane after its matching call returns (§5).
    pub fn lane_sync(&self) {
        self.barrier.wait();
    }

    /// Two-phase broadcast: `broadcast_idx` writes `*value` into the shared slot, every
    /// lane observes it after the second barrier. Must be called collectively by every
    /// participant at the same program point or it deadlocks (§4.C).
    pub fn lane_sync_u64(&self, broadcast_idx: u32, value: &mut u64) {
        if self.thread_idx == broadcast_idx {
            self.broadcast_memory.store(*value, Ordering::Release);
        }
        self.lane_sync();

        if self.thread_idx != broadcast_idx {
            *value = self.broadcast_memory.load(Ordering::Acquire);
        }
        self.lane_sync();
    }

    /// Deterministic equal partition of `[0, values_count)` across `thread_count`
    /// lanes, with one extra element distributed to each of the first
    /// `values_count % thread_count` threads. Ported directly from `_lane_range`.
    pub fn lane_range(&self, values_count: u64) -> Range {
        let thread_count = self.thread_count as u64;
        let thread_idx = self.thread_idx as u64;

        let values_per_thread = values_count / thread_count;
        let leftover_values_count = values_count % thread_count;
        let thread_has_leftover = thread_idx < leftover_values_count;
        let leftover_count_before_this_thread = if thread_has_leftover {
            thread_idx
        } else {
            leftover_values_count
        };

        let min = values_per_thread * thread_idx + leftover_count_before_this_thread;
        let max = min + values_per_thread + if thread_has_leftover { 1 } else { 0 };

        Range { min, max }
    }

    /// Resets this thread's temporary arena, done at well-defined points: the end of a
    /// `run` invocation or the end of a frame (§4.C).
    pub fn reset_temp_arena(&mut self) {
        self.temp_arena.reset();
    }
}

thread_local! {
    static CURRENT: Cell<*mut ThreadContext> = Cell::new(std::ptr::null_mut());
}

/// Returns the calling thread's current context, if one has been set via
/// `set_current`. Modeled as a thread-local per §9's design note preferring
/// explicit injection; this remains available for code paths (notably task
/// callbacks) that cannot thread a `&ThreadContext` through a C-style function
/// pointer signature.
///
/// # Safety
/// The caller must ensure the `ThreadContext` pointed to by a prior `set_current`
/// call outlives this call.
pub unsafe fn tctx_current<'a>() -> Option<&'a ThreadContext> {
    CURRENT.with(|c| {
        let ptr = c.get();
        if ptr.is_null() {
            None
        } else {
            Some(&*ptr)
        }
    })
}

/// Installs `ctx` as the calling thread's current context.
///
/// # Safety
/// `ctx` must remain valid for as long as it stays installed; callers must clear it
/// (pass a null-equivalent, i.e. never call this again with a dangling pointer) before
/// the referent is dropped.
pub unsafe fn tctx_set_current(ctx: *mut ThreadContext) {
    CURRENT.with(|c| c.set(ctx));
}

/// Whether the calling thread is lane 0 of whatever group it belongs to. `false` if no
/// context has been set.
pub fn is_main_thread() -> bool {
    unsafe { tctx_current().map(|c| c.is_main_thread()).unwrap_or(false) }
}
