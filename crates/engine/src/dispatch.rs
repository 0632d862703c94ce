//! Shared worker pool for listener dispatch.
//!
//! A fixed set of worker threads drains a FIFO queue of boxed closures.
//! Submitting never waits for the work to run. A panicking task is caught and
//! logged; it neither kills its worker nor disturbs bookkeeping.
//!
//! Shutdown gives in-flight and queued work a bounded grace period. Whatever
//! has not finished by then is abandoned: queued tasks are dropped unrun,
//! still-running workers are detached, and the count is reported.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, warn};

type Task = Box<dyn FnOnce() + Send>;

/// Why a task was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Queue is at capacity
    #[error("dispatch queue is full")]
    Saturated,
    /// Pool has been shut down
    #[error("dispatch pool is shut down")]
    ShutDown,
}

/// Pool metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Tasks currently executing.
    pub active_tasks: usize,
    /// Tasks finished (including panicked ones) since creation.
    pub tasks_completed: u64,
    /// Tasks that panicked.
    pub tasks_panicked: u64,
    /// Worker threads.
    pub worker_count: usize,
}

/// Outcome of [`DispatchPool::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that ran to completion over the pool's lifetime
    pub completed: u64,
    /// Tasks dropped from the queue or still running when the grace period ran out
    pub abandoned: usize,
}

struct PoolInner {
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    idle: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    max_queue_depth: usize,
    tasks_completed: AtomicU64,
    tasks_panicked: AtomicU64,
}

impl PoolInner {
    fn is_idle(&self) -> bool {
        self.queue_depth.load(Ordering::Acquire) == 0
            && self.active_tasks.load(Ordering::Acquire) == 0
    }
}

/// Fixed-size pool of dispatch workers
pub struct DispatchPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl DispatchPool {
    /// Create a pool with `num_threads` workers.
    ///
    /// Workers are named `folio-dispatch-0`, `folio-dispatch-1`, etc.
    pub fn new(num_threads: usize, max_queue_depth: usize) -> Self {
        let num_threads = num_threads.max(1);
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            max_queue_depth: max_queue_depth.max(1),
            tasks_completed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner_clone = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("folio-dispatch-{}", i))
                .spawn(move || worker_loop(&inner_clone))
                .expect("failed to spawn dispatch worker thread");
            workers.push(handle);
        }

        Self {
            inner,
            workers: Mutex::new(workers),
            num_threads,
        }
    }

    /// Queue a task. Never waits for it to run.
    pub fn submit(&self, work: impl FnOnce() + Send + 'static) -> Result<(), DispatchError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }

        {
            let mut queue = self.inner.queue.lock();
            // Re-check under the lock: shutdown clears the queue while holding it
            if self.inner.shutdown.load(Ordering::Acquire) {
                return Err(DispatchError::ShutDown);
            }
            if queue.len() >= self.inner.max_queue_depth {
                return Err(DispatchError::Saturated);
            }
            queue.push_back(Box::new(work));
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }

        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no task is running.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !self.inner.is_idle() {
            self.inner.idle.wait(&mut queue);
        }
    }

    /// Like [`drain`](Self::drain) but gives up after `timeout`.
    ///
    /// Returns `true` if the pool went idle in time.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.queue.lock();
        while !self.inner.is_idle() {
            if self.inner.idle.wait_until(&mut queue, deadline).timed_out() {
                return self.inner.is_idle();
            }
        }
        true
    }

    /// Stop accepting work, wait up to `grace` for pending work, then abandon the rest.
    ///
    /// Calling it again after the first shutdown returns an empty report.
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return ShutdownReport {
                completed: self.inner.tasks_completed.load(Ordering::Relaxed),
                abandoned: 0,
            };
        }

        let deadline = Instant::now() + grace;
        let (dropped, still_running) = {
            let mut queue = self.inner.queue.lock();
            // Wake idle workers so they notice shutdown once the queue empties
            self.inner.work_ready.notify_all();
            while !self.inner.is_idle() {
                if self.inner.idle.wait_until(&mut queue, deadline).timed_out() {
                    break;
                }
            }
            let dropped = queue.len();
            queue.clear();
            self.inner.queue_depth.store(0, Ordering::Release);
            (dropped, self.inner.active_tasks.load(Ordering::Acquire))
        };
        self.inner.work_ready.notify_all();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        if still_running == 0 {
            for handle in handles {
                let _ = handle.join();
            }
        }
        // Otherwise the handles are dropped and the stuck workers detach

        let abandoned = dropped + still_running;
        if abandoned > 0 {
            warn!(
                target: "folio::notify",
                dropped,
                still_running,
                grace_ms = grace.as_millis() as u64,
                "dispatch pool shut down with abandoned tasks"
            );
        }

        ShutdownReport {
            completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            abandoned,
        }
    }

    /// Whether shutdown has begun
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Return a snapshot of pool metrics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_tasks: self.inner.active_tasks.load(Ordering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.inner.tasks_panicked.load(Ordering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

impl std::fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("stats", &self.stats())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Decrements `active_tasks` and wakes idle waiters on drop, panic or not.
struct ActiveTaskGuard<'a> {
    inner: &'a PoolInner,
}

impl Drop for ActiveTaskGuard<'_> {
    fn drop(&mut self) {
        // Count first so an observer that sees the pool idle also sees the count
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::Release);

        // Lock before notifying so a waiter between its check and wait() is not missed
        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.idle.notify_all();
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };

        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            inner.tasks_panicked.fetch_add(1, Ordering::Relaxed);
            error!(
                target: "folio::notify",
                "dispatch task panicked: {}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}
