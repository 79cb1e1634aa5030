//! Worker-pool task system (component E).
//!
//! Grounded on `original_source/multicore-wasm/lib/task.c`'s `task_system_init`,
//! `task_schedule`/`task_schedule_after`, `task_queue_wait`, and `task_execute_one`'s
//! full reserve/write/spin/release ticket publish (used here, unlike the cooperative
//! drain in [`crate::task`], because workers run without barriers between them).

use crate::task::{ResourceAccess, TaskHandle, TaskQueue};
use crate::thread::{cpu_pause, Semaphore, Thread};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A long-lived worker pool draining a shared [`TaskQueue`] (§4.E).
pub struct TaskSystem {
    inner: Arc<Inner>,
    workers: Mutex<Vec<Thread>>,
}

struct Inner {
    queue: TaskQueue,
    semaphore: Semaphore,
    tasks_in_flight: AtomicU64,
    shutting_down: AtomicBool,
}

impl TaskSystem {
    /// Spawns `worker_count` workers, defaulting to the host's logical core count
    /// (mirroring `original_source`'s `os_core_count`) when `worker_count` is `None`.
    pub fn new(worker_count: Option<usize>) -> TaskSystem {
        let worker_count = worker_count.unwrap_or_else(num_cpus::get).max(1);
        let inner = Arc::new(Inner {
            queue: TaskQueue::new(),
            semaphore: Semaphore::new(0),
            tasks_in_flight: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let inner = inner.clone();
            workers.push(Thread::launch(move || worker_loop(inner, id)));
        }

        TaskSystem {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Schedules a task with no declared dependencies.
    pub fn schedule<F>(&self, func: F) -> TaskHandle
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule_after(func, &[], &[])
    }

    /// Schedules a task that becomes ready once every handle in `deps` has completed.
    pub fn schedule_after<F>(&self, func: F, resources: &[ResourceAccess], deps: &[TaskHandle]) -> TaskHandle
    where
        F: FnMut() + Send + 'static,
    {
        self.inner.tasks_in_flight.fetch_add(1, Ordering::SeqCst);
        let handle = self.inner.queue.append_with_resources(func, resources, deps);
        if deps.is_empty() {
            self.inner.semaphore.drop_permit();
        }
        handle
    }

    /// Blocks until every task scheduled so far (transitively, including dependents
    /// scheduled by running tasks before this call observes them) has completed.
    pub fn wait_idle(&self) {
        while self.inner.tasks_in_flight.load(Ordering::SeqCst) > 0 {
            cpu_pause();
        }
    }

    /// Clears queue bookkeeping once idle, so handles can be reused for a new batch.
    pub fn reset(&self) {
        self.wait_idle();
        self.inner.queue.reset_counters();
    }

    /// Signals every worker to stop after draining in-flight work and joins them.
    pub fn shutdown(mut self) {
        self.wait_idle();
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let worker_count = self.workers.lock().len();
        for _ in 0..worker_count {
            self.inner.semaphore.drop_permit();
        }
        for worker in self.workers.lock().drain(..) {
            worker.join(0);
        }
    }
}

fn worker_loop(inner: Arc<Inner>, worker_id: usize) {
    loop {
        inner.semaphore.take();
        if inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let handle = match inner.queue.take_ready() {
            Some(h) => h,
            None => continue,
        };

        debug!(worker_id, task = handle.0, "executing task");
        let newly_ready = inner.queue.execute_one_and_collect_ready(handle);
        for ready in &newly_ready {
            inner.queue.publish_ready_ticketed(*ready);
            inner.semaphore.drop_permit();
        }
        inner.tasks_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
