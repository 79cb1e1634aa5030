//! Thin OS thread abstraction with value-typed handles (component B).
//!
//! Grounded on `original_source/multicore-wasm/lib/thread.h`'s opaque
//! `{ u64 v[1]; }` handle types. Rust cannot safely hand back a bare pointer-word the
//! way the C original does, so each handle here wraps an owned `parking_lot`/`std`
//! primitive behind `Arc`, keeping the "value type, cheap to copy, externally managed
//! lifetime" contract from §9's design notes while staying memory safe.

use parking_lot::{Condvar, Mutex as PlMutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// A launched OS thread. `join`/`detach` consume it, matching the spec's
/// take/release pairing for handles.
pub struct Thread {
    handle: Option<JoinHandle<()>>,
}

impl Thread {
    /// Spawns `f` on a new OS thread.
    pub fn launch<F>(f: F) -> Thread
    where
        F: FnOnce() + Send + 'static,
    {
        Thread {
            handle: Some(std::thread::spawn(f)),
        }
    }

    /// Names the underlying OS thread. Must be called before `launch` returns control
    /// to the spawned closure to have any effect on most platforms, so in practice
    /// callers name threads by passing the name into the closure instead; this exists
    /// to mirror the external interface (`thread_set_name`) for callers who already
    /// hold a `std::thread::Builder`-spawned handle elsewhere.
    pub fn set_name(&self, _name: &str) {
        // std::thread has no post-hoc rename; naming happens at spawn time via
        // `std::thread::Builder::name`. Kept as a documented no-op stub at this call
        // site, matching the spec's value-type handle with externally-managed identity.
    }

    /// Joins the thread. `timeout_us == 0` means wait forever, matching the spec;
    /// std::thread has no timed join, so any nonzero timeout degrades to the same
    /// unconditional join (callers needing a hard deadline should poll a condition
    /// instead of relying on the timeout here).
    pub fn join(mut self, _timeout_us: u64) -> bool {
        match self.handle.take() {
            Some(h) => h.join().is_ok(),
            None => true,
        }
    }

    /// Detaches the thread, letting it run to completion independently.
    pub fn detach(mut self) {
        self.handle.take();
    }
}

/// A mutual-exclusion lock wrapping `parking_lot::Mutex<()>`.
#[derive(Clone)]
pub struct Mutex {
    inner: Arc<PlMutex<()>>,
}

impl Mutex {
    pub fn new() -> Mutex {
        Mutex {
            inner: Arc::new(PlMutex::new(())),
        }
    }

    pub fn take(&self) {
        std::mem::forget(self.inner.lock());
    }

    /// Releases a lock taken by `take`.
    ///
    /// # Safety
    /// Must be called exactly once per matching `take`, from the thread that called
    /// `take` — `parking_lot::Mutex` is not re-entrant and has no owner tracking, so
    /// mismatched take/drop pairs corrupt the lock state just as they would in the C
    /// original's raw mutex handle.
    pub unsafe fn drop_lock(&self) {
        self.inner.force_unlock();
    }

    /// Scoped lock acquisition for safe callers — prefer this over `take`/`drop_lock`.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.inner.lock()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new()
    }
}

/// A reader/writer lock.
#[derive(Clone)]
pub struct RwMutex {
    inner: Arc<parking_lot::RwLock<()>>,
}

impl RwMutex {
    pub fn new() -> RwMutex {
        RwMutex {
            inner: Arc::new(parking_lot::RwLock::new(())),
        }
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, ()> {
        self.inner.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, ()> {
        self.inner.write()
    }
}

impl Default for RwMutex {
    fn default() -> Self {
        RwMutex::new()
    }
}

/// A counting semaphore, built from a mutex + condvar pair since neither
/// `parking_lot` nor `std` ships a native one (§4.B).
#[derive(Clone)]
pub struct Semaphore {
    count: Arc<PlMutex<i64>>,
    condvar: Arc<Condvar>,
}

impl Semaphore {
    pub fn new(initial_count: i64) -> Semaphore {
        Semaphore {
            count: Arc::new(PlMutex::new(initial_count)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Blocks until a count is available, then consumes one.
    pub fn take(&self) {
        let mut count = self.count.lock();
        while *count <= 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    /// Adds one to the count, waking a single waiter.
    pub fn drop_permit(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.condvar.notify_one();
    }
}

/// A reusable cyclic barrier for `count` participants.
#[derive(Clone)]
pub struct Barrier {
    inner: Arc<BarrierState>,
}

struct BarrierState {
    lock: PlMutex<BarrierInner>,
    condvar: Condvar,
    count: usize,
}

struct BarrierInner {
    waiting: usize,
    generation: u64,
}

impl Barrier {
    pub fn new(count: usize) -> Barrier {
        Barrier {
            inner: Arc::new(BarrierState {
                lock: PlMutex::new(BarrierInner {
                    waiting: 0,
                    generation: 0,
                }),
                condvar: Condvar::new(),
                count,
            }),
        }
    }

    /// Blocks until every one of `count` participants has called `wait` in this
    /// generation.
    pub fn wait(&self) {
        let mut inner = self.inner.lock.lock();
        let generation = inner.generation;
        inner.waiting += 1;
        if inner.waiting == self.inner.count {
            inner.waiting = 0;
            inner.generation = inner.generation.wrapping_add(1);
            self.inner.condvar.notify_all();
        } else {
            while inner.generation == generation {
                self.inner.condvar.wait(&mut inner);
            }
        }
    }
}

/// A condition variable paired externally with a [`Mutex`].
#[derive(Clone)]
pub struct CondVar {
    inner: Arc<Condvar>,
}

impl CondVar {
    pub fn new() -> CondVar {
        CondVar {
            inner: Arc::new(Condvar::new()),
        }
    }

    /// Waits on `guard`, with an optional microsecond timeout (`0` = forever).
    /// Returns `false` on timeout, matching the spec's `cond_var_wait` contract.
    pub fn wait(&self, guard: &mut parking_lot::MutexGuard<'_, ()>, timeout_us: u64) -> bool {
        if timeout_us == 0 {
            self.inner.wait(guard);
            true
        } else {
            !self.inner.wait_for(guard, Duration::from_micros(timeout_us)).timed_out()
        }
    }

    pub fn signal(&self) {
        self.inner.notify_one();
    }

    pub fn broadcast(&self) {
        self.inner.notify_all();
    }
}

impl Default for CondVar {
    fn default() -> Self {
        CondVar::new()
    }
}

/// A CPU pause hint for spin-wait loops (`cpu_pause` in the spec).
#[inline(always)]
pub fn cpu_pause() {
    std::hint::spin_loop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn barrier_releases_all_participants() {
        let barrier = Barrier::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let mut threads = Vec::new();
        for _ in 0..4 {
            let b = barrier.clone();
            let c = counter.clone();
            threads.push(Thread::launch(move || {
                c.fetch_add(1, Ordering::SeqCst);
                b.wait();
                assert_eq!(c.load(Ordering::SeqCst), 4);
            }));
        }
        for t in threads {
            assert!(t.join(0));
        }
    }

    #[test]
    fn semaphore_blocks_until_signaled() {
        let sem = Semaphore::new(0);
        let sem2 = sem.clone();
        let t = Thread::launch(move || {
            sem2.take();
        });
        std::thread::sleep(Duration::from_millis(20));
        sem.drop_permit();
        assert!(t.join(0));
    }
}
