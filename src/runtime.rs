//! Cooperative multi-lane runtime entry point (component D, external interface).
//!
//! Grounded on `original_source/multicore-wasm/lib/multicore_runtime.c`'s `mcr_run`:
//! spawn `thread_count` lanes sharing one [`Barrier`] and one broadcast slot, hand
//! each lane a private temp arena carved out of a caller-supplied backing buffer,
//! install it as the lane's current [`ThreadContext`], and run the entrypoint once
//! per lane before joining every thread. `mcr_run` took a raw `MCREntrypointFunc`
//! plus an arena it used to allocate the thread/context arrays themselves; here the
//! caller passes an already-allocated backing buffer instead; everything else
//! (barrier, broadcast word, per-lane temp arena, lane 0 named "MCR Main") matches.

use crate::context::{tctx_set_current, ThreadContext};
use crate::memory::Arena;
use crate::thread::{Barrier, Thread};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// The cooperative runtime's single entry point.
pub struct Runtime;

impl Runtime {
    /// Runs `entrypoint` once on each of `thread_count` lanes, then blocks until
    /// every lane returns. `backing` is sliced into `thread_count` chunks of
    /// `temp_arena_size` bytes each, one per lane's [`ThreadContext::temp_arena`].
    ///
    /// # Panics
    /// If `backing` is smaller than `thread_count as usize * temp_arena_size`.
    pub fn run<F>(thread_count: u8, temp_arena_size: usize, backing: &mut [u8], entrypoint: F)
    where
        F: Fn(&ThreadContext) + Sync + Send + 'static,
    {
        assert!(
            backing.len() >= thread_count as usize * temp_arena_size,
            "backing buffer of {} bytes too small for {} lanes of {} bytes each",
            backing.len(),
            thread_count,
            temp_arena_size
        );

        let barrier = Barrier::new(thread_count as usize);
        let broadcast = Arc::new(AtomicU64::new(0));
        let entrypoint = Arc::new(entrypoint);

        // Raw addresses, not slices, cross into the `Send + 'static` thread closures
        // below: `backing` is borrowed only for the duration of this call, which
        // doesn't return until every spawned thread has been joined.
        let backing_addr = backing.as_mut_ptr() as usize;

        let mut threads = Vec::with_capacity(thread_count as usize);
        for lane in 0..thread_count {
            let barrier = barrier.clone();
            let broadcast = broadcast.clone();
            let entrypoint = entrypoint.clone();
            let offset = lane as usize * temp_arena_size;

            let thread = Thread::launch(move || {
                // SAFETY: each lane's chunk is disjoint from every other lane's, and
                // `backing` outlives every spawned thread since `Runtime::run` joins
                // them all before returning.
                let chunk = unsafe { std::slice::from_raw_parts_mut((backing_addr + offset) as *mut u8, temp_arena_size) };
                let arena = Arena::from_buffer(chunk);
                let mut ctx = ThreadContext::new(lane as u32, thread_count as u32, barrier, broadcast, arena);

                unsafe { tctx_set_current(&mut ctx as *mut ThreadContext) };
                entrypoint(&ctx);
                unsafe { tctx_set_current(std::ptr::null_mut()) };
            });

            // `thread_set_name` is a documented no-op post-spawn on this platform
            // (see `Thread::set_name`); kept here to mirror `mcr_run`'s naming calls.
            if lane == 0 {
                thread.set_name("MCR Main");
            } else {
                thread.set_name(&format!("MCR Thread {}", lane));
            }
            threads.push(thread);
        }

        for thread in threads {
            thread.join(0);
        }
    }
}
