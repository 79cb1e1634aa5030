//! Dependency-graph task queue (component D), cooperative runtime mode.
//!
//! Grounded on `original_source/multicore-wasm/lib/task.c`'s `_task_queue_append` and
//! `task_queue_process`: a fixed-capacity task array drained across barrier
//! synchronisation points by every lane in a thread group (§4.D).

use crate::context::ThreadContext;
use crate::thread::cpu_pause;
use arrayvec::ArrayVec;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

/// Hard capacity for the task array (§6).
pub const MAX_TASKS: usize = 256;
/// Hard capacity for a single task's dependents list (§6).
pub const MAX_DEPENDENTS: usize = 32;
/// Hard capacity for a single task's declared resource accesses (§6, DEBUG only).
pub const MAX_TASK_RESOURCES: usize = 16;

/// An index into a [`TaskQueue`]'s task array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub(crate) u32);

impl TaskHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Read or write access mode for a declared task resource (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// A single declared memory-range access, used only by the DEBUG race checker.
#[derive(Debug, Clone, Copy)]
pub struct ResourceAccess {
    pub mode: AccessMode,
    pub ptr: usize,
    pub size: usize,
}

impl ResourceAccess {
    pub fn read<T>(ptr: *const T, count: usize) -> ResourceAccess {
        ResourceAccess {
            mode: AccessMode::Read,
            ptr: ptr as usize,
            size: std::mem::size_of::<T>() * count,
        }
    }

    pub fn write<T>(ptr: *const T, count: usize) -> ResourceAccess {
        ResourceAccess {
            mode: AccessMode::Write,
            ptr: ptr as usize,
            size: std::mem::size_of::<T>() * count,
        }
    }

    fn overlaps(&self, other: &ResourceAccess) -> bool {
        let my_end = self.ptr + self.size;
        let other_end = other.ptr + other.size;
        self.ptr < other_end && other.ptr < my_end
    }

    fn conflicts(&self, other: &ResourceAccess) -> bool {
        self.overlaps(other) && (self.mode == AccessMode::Write || other.mode == AccessMode::Write)
    }
}

type TaskFn = Box<dyn FnMut() + Send>;

/// One task slot. Dependent bookkeeping uses atomics directly (handle index + 1,
/// 0 = empty) so appending a dependent never needs a lock even when multiple
/// producer threads declare the same dependency concurrently.
struct TaskSlot {
    func: Mutex<Option<TaskFn>>,
    dependency_count_remaining: AtomicI32,
    dependent_ids: [AtomicU32; MAX_DEPENDENTS],
    dependents_count: AtomicU32,
    #[cfg(feature = "debug-checks")]
    resources: Mutex<ArrayVec<[ResourceAccess; MAX_TASK_RESOURCES]>>,
}

impl TaskSlot {
    fn new() -> TaskSlot {
        TaskSlot {
            func: Mutex::new(None),
            dependency_count_remaining: AtomicI32::new(0),
            dependent_ids: Default::default(),
            dependents_count: AtomicU32::new(0),
            #[cfg(feature = "debug-checks")]
            resources: Mutex::new(ArrayVec::new()),
        }
    }

    fn clear_for_reuse(&self, dep_count: usize) {
        self.dependency_count_remaining.store(dep_count as i32, Ordering::SeqCst);
        self.dependents_count.store(0, Ordering::SeqCst);
        for slot in &self.dependent_ids {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

/// A dependency-graph task queue shared by the cooperative runtime (§4.D) and the
/// worker-pool task system (§4.E, see [`crate::task_system`]).
pub struct TaskQueue {
    tasks: Vec<TaskSlot>,
    tasks_count: CachePadded<AtomicU64>,

    ready_queue: Vec<AtomicU32>,
    ready_write_idx: CachePadded<AtomicU64>,
    ready_count: CachePadded<AtomicU64>,
    ready_counter: CachePadded<AtomicU64>,

    pub(crate) next_ready_queue: Vec<AtomicU32>,
    pub(crate) next_ready_count: CachePadded<AtomicU64>,
}

impl TaskQueue {
    pub fn new() -> TaskQueue {
        TaskQueue {
            tasks: (0..MAX_TASKS).map(|_| TaskSlot::new()).collect(),
            tasks_count: CachePadded::new(AtomicU64::new(0)),
            ready_queue: (0..MAX_TASKS).map(|_| AtomicU32::new(0)).collect(),
            ready_write_idx: CachePadded::new(AtomicU64::new(0)),
            ready_count: CachePadded::new(AtomicU64::new(0)),
            ready_counter: CachePadded::new(AtomicU64::new(0)),
            next_ready_queue: (0..MAX_TASKS).map(|_| AtomicU32::new(0)).collect(),
            next_ready_count: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub fn tasks_count(&self) -> u64 {
        self.tasks_count.load(Ordering::SeqCst)
    }

    /// Publishes `handle` to the ready queue via the reserve/write/spin/release
    /// ticket protocol (§9's "atomic publication of a queue slot"). Used both for a
    /// dependency-free task's initial publish and, by the worker pool in
    /// `task_system`, for a dependent that just became ready — workers run
    /// concurrently with no barrier between them, so the full ticket handshake is
    /// required there (unlike the cooperative drain below).
    pub(crate) fn publish_ready_ticketed(&self, handle: TaskHandle) {
        let slot = self.ready_write_idx.fetch_add(1, Ordering::SeqCst);
        assert!((slot as usize) < MAX_TASKS, "ready queue overflow: MAX_TASKS exceeded");
        self.ready_queue[slot as usize].store(handle.0 + 1, Ordering::Relaxed);
        while self.ready_count.load(Ordering::Acquire) < slot {
            cpu_pause();
        }
        self.ready_count.store(slot + 1, Ordering::Release);
    }

    /// Pops one handle from the ready queue for worker-pool consumption. `None`
    /// means no published entry remains for this cursor position (the caller's
    /// semaphore permit raced with another worker).
    pub(crate) fn take_ready(&self) -> Option<TaskHandle> {
        let idx = self.ready_counter.fetch_add(1, Ordering::SeqCst);
        if idx >= self.ready_count.load(Ordering::Acquire) {
            return None;
        }
        Some(TaskHandle(self.ready_queue[idx as usize].load(Ordering::Acquire) - 1))
    }

    /// Resets queue bookkeeping for reuse once the worker pool is known idle.
    pub(crate) fn reset_counters(&self) {
        self.tasks_count.store(0, Ordering::SeqCst);
        self.ready_write_idx.store(0, Ordering::SeqCst);
        self.ready_count.store(0, Ordering::SeqCst);
        self.ready_counter.store(0, Ordering::SeqCst);
    }

    /// Appends a task with no declared resources (debug race check sees an empty set).
    pub fn append<F>(&self, func: F, deps: &[TaskHandle]) -> TaskHandle
    where
        F: FnMut() + Send + 'static,
    {
        self.append_with_resources(func, &[], deps)
    }

    /// Reserves a slot, wires dependencies, and publishes to the ready queue if the
    /// task has none. In DEBUG builds, also runs the race checker (§4.D).
    pub fn append_with_resources<F>(&self, func: F, resources: &[ResourceAccess], deps: &[TaskHandle]) -> TaskHandle
    where
        F: FnMut() + Send + 'static,
    {
        let idx = self.tasks_count.fetch_add(1, Ordering::SeqCst) as usize;
        assert!(idx < MAX_TASKS, "task queue overflow: MAX_TASKS exceeded");

        let slot = &self.tasks[idx];
        slot.clear_for_reuse(deps.len());
        *slot.func.lock() = Some(Box::new(func));

        let handle = TaskHandle(idx as u32);

        for dep in deps {
            let dep_slot = &self.tasks[dep.index()];
            let dependent_slot_idx = dep_slot.dependents_count.fetch_add(1, Ordering::SeqCst) as usize;
            assert!(dependent_slot_idx < MAX_DEPENDENTS, "dependents overflow: MAX_DEPENDENTS exceeded");
            dep_slot.dependent_ids[dependent_slot_idx].store(handle.0 + 1, Ordering::Release);
        }

        if deps.is_empty() {
            self.publish_ready_ticketed(handle);
        }

        #[cfg(feature = "debug-checks")]
        {
            let mut stored = ArrayVec::new();
            for r in resources {
                stored.push(*r);
            }
            *slot.resources.lock() = stored;

            self.check_for_races(idx, resources, deps);
        }
        #[cfg(not(feature = "debug-checks"))]
        {
            let _ = resources;
        }

        handle
    }

    #[cfg(feature = "debug-checks")]
    fn check_for_races(&self, task_idx: usize, resources: &[ResourceAccess], deps: &[TaskHandle]) {
        for other_idx in 0..task_idx {
            let other = &self.tasks[other_idx];
            let other_resources = other.resources.lock();
            for mine in resources {
                for theirs in other_resources.iter() {
                    if mine.conflicts(theirs) {
                        let is_dependency = deps.iter().any(|d| d.index() == other_idx);
                        assert!(
                            is_dependency,
                            "data race detected: task {} conflicts with task {} on overlapping memory with no dependency edge",
                            task_idx, other_idx
                        );
                    }
                }
            }
        }
    }

    /// Runs the task at `handle`, decrements each dependent's remaining-dependency
    /// count, and returns the dependents that just became ready. Shared by the
    /// cooperative drain below and the worker-pool executor in `task_system`.
    pub(crate) fn execute_one_and_collect_ready(&self, handle: TaskHandle) -> ArrayVec<[TaskHandle; MAX_DEPENDENTS]> {
        let slot = &self.tasks[handle.index()];
        let mut f = slot.func.lock().take().expect("task executed more than once");
        f();

        let mut newly_ready = ArrayVec::new();
        let dependents_count = slot.dependents_count.load(Ordering::Acquire) as usize;
        for i in 0..dependents_count {
            let dep_val = slot.dependent_ids[i].load(Ordering::Acquire);
            let dep_handle = TaskHandle(dep_val - 1);
            let dep_slot = &self.tasks[dep_handle.index()];
            let remaining = dep_slot.dependency_count_remaining.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining == 0 {
                newly_ready.push(dep_handle);
            }
        }
        newly_ready
    }

    /// Collective cooperative drain (§4.D). Every lane in `ctx`'s thread group must
    /// call this at the same program point.
    pub fn process(&self, ctx: &ThreadContext) {
        self.ready_counter.store(0, Ordering::SeqCst);
        if ctx.is_main_thread() {
            self.next_ready_count.store(0, Ordering::SeqCst);
        }
        ctx.lane_sync();

        loop {
            loop {
                let ready_idx = self.ready_counter.fetch_add(1, Ordering::SeqCst);
                if ready_idx >= self.ready_count.load(Ordering::Acquire) {
                    break;
                }
                let handle = TaskHandle(self.ready_queue[ready_idx as usize].load(Ordering::Acquire) - 1);
                for ready in self.execute_one_and_collect_ready(handle) {
                    let next_idx = self.next_ready_count.fetch_add(1, Ordering::SeqCst);
                    self.next_ready_queue[next_idx as usize].store(ready.0 + 1, Ordering::Relaxed);
                }
            }

            // Every lane must observe the fully-formed next ready queue before anyone
            // decides whether to loop again.
            ctx.lane_sync();

            let next_count = self.next_ready_count.load(Ordering::Acquire);
            if next_count > 0 {
                ctx.lane_sync();
                if ctx.is_main_thread() {
                    for i in 0..next_count as usize {
                        let v = self.next_ready_queue[i].load(Ordering::Relaxed);
                        self.ready_queue[i].store(v, Ordering::Relaxed);
                    }
                    self.ready_count.store(next_count, Ordering::SeqCst);
                    self.ready_counter.store(0, Ordering::SeqCst);
                    self.next_ready_count.store(0, Ordering::SeqCst);
                }
                ctx.lane_sync();
                continue;
            }

            break;
        }

        self.ready_counter.store(0, Ordering::SeqCst);
        self.ready_count.store(0, Ordering::SeqCst);
        self.ready_write_idx.store(0, Ordering::SeqCst);
        self.tasks_count.store(0, Ordering::SeqCst);
        self.next_ready_count.store(0, Ordering::SeqCst);
        ctx.lane_sync();
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        TaskQueue::new()
    }
}
