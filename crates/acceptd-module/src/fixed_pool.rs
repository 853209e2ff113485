//! `FixedPool`: default `WorkerPool` implementation.
//!
//! Spawns N OS threads at creation. The acceptor pushes tasks into a
//! lock-free bounded MPMC queue; workers pop and run them. Idle workers
//! sleep on a condvar and are woken one per submission.
//!
//! No dynamic scaling.

use acceptd_core::config::PoolConfig;
use acceptd_core::error::{AcceptdError, RejectReason, Result};
use acceptd_core::pool::{Rejected, ShutdownMode, ShutdownReport, SubmitPolicy, WorkerPool};
use acceptd_core::task::Task;

use crossbeam_queue::ArrayQueue;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error};

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const STOPPING: u8 = 2;

/// Upper bound on an idle worker's sleep, in case a wakeup is missed.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Shared state between the submitter and workers.
struct PoolInner {
    /// Work queue: acceptor → workers.
    queue: ArrayQueue<Task>,
    /// RUNNING, DRAINING or STOPPING.
    state: AtomicU8,
    /// Number of workers currently running a task.
    active: AtomicUsize,
    /// Tasks that returned normally.
    completed: AtomicU64,
    /// Tasks whose handler panicked.
    panicked: AtomicU64,
    /// Guards the sleep/wake handshake; protects no data.
    lock: Mutex<()>,
    /// Signalled on submit and on shutdown.
    work_ready: Condvar,
    /// Signalled when a worker frees a queue slot (Block policy only).
    space_ready: Condvar,
    policy: SubmitPolicy,
    total: usize,
}

impl PoolInner {
    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wake_submitter(&self) {
        if matches!(self.policy, SubmitPolicy::Block(_)) {
            let _guard = self.lock();
            self.space_ready.notify_one();
        }
    }

    fn wake_all(&self) {
        let _guard = self.lock();
        self.work_ready.notify_all();
        self.space_ready.notify_all();
    }
}

pub struct FixedPool {
    inner: Arc<PoolInner>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl FixedPool {
    /// Create a pool per `config`.
    ///
    /// Fails with a `Resource` error if any worker thread cannot be
    /// spawned; workers already started are stopped first.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;

        let inner = Arc::new(PoolInner {
            queue: ArrayQueue::new(config.queue_capacity),
            state: AtomicU8::new(RUNNING),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            lock: Mutex::new(()),
            work_ready: Condvar::new(),
            space_ready: Condvar::new(),
            policy: config.submit_policy,
            total: config.workers,
        });

        let mut handles = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let worker_inner = Arc::clone(&inner);
            let spawned = thread::Builder::new()
                .name(format!("acceptd-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_inner, worker_id));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    inner.state.store(STOPPING, Ordering::Release);
                    inner.wake_all();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(AcceptdError::Resource {
                        op: "spawn worker thread",
                        source,
                    });
                }
            }
        }

        debug!(
            workers = config.workers,
            queue = config.queue_capacity,
            "worker pool started"
        );
        Ok(FixedPool {
            inner,
            handles: Mutex::new(handles),
        })
    }

    /// Tasks that returned normally so far.
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    /// Tasks whose handler panicked so far.
    pub fn panicked(&self) -> u64 {
        self.inner.panicked.load(Ordering::Relaxed)
    }

    fn push_blocking(&self, mut task: Task, max_wait: Duration) -> std::result::Result<(), Rejected> {
        let deadline = Instant::now() + max_wait;
        let mut guard = self.inner.lock();
        loop {
            if self.inner.state() != RUNNING {
                return Err(Rejected {
                    reason: RejectReason::ShuttingDown,
                    task,
                });
            }
            match self.inner.queue.push(task) {
                Ok(()) => {
                    self.inner.work_ready.notify_one();
                    return Ok(());
                }
                Err(back) => task = back,
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Rejected {
                    reason: RejectReason::QueueFull,
                    task,
                });
            }
            guard = match self.inner.space_ready.wait_timeout(guard, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl WorkerPool for FixedPool {
    fn submit(&self, task: Task) -> std::result::Result<(), Rejected> {
        // State check and push happen under the lock shutdown() flips the
        // state with, so a queued task is always seen by a draining worker.
        let task = {
            let _guard = self.inner.lock();
            if self.inner.state() != RUNNING {
                return Err(Rejected {
                    reason: RejectReason::ShuttingDown,
                    task,
                });
            }
            match self.inner.queue.push(task) {
                Ok(()) => {
                    self.inner.work_ready.notify_one();
                    return Ok(());
                }
                Err(task) => task,
            }
        };
        match self.inner.policy {
            SubmitPolicy::Reject => Err(Rejected {
                reason: RejectReason::QueueFull,
                task,
            }),
            SubmitPolicy::Block(max_wait) => self.push_blocking(task, max_wait),
        }
    }

    fn shutdown(&self, mode: ShutdownMode) -> Result<ShutdownReport> {
        let target = match mode {
            ShutdownMode::Drain => DRAINING,
            ShutdownMode::Immediate => STOPPING,
        };

        let (first, abandoned) = {
            let _guard = self.inner.lock();
            let first = self
                .inner
                .state
                .compare_exchange(RUNNING, target, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();

            let mut abandoned = 0u64;
            if first && mode == ShutdownMode::Immediate {
                // Dropping a task closes its connection.
                while let Some(task) = self.inner.queue.pop() {
                    drop(task);
                    abandoned += 1;
                }
            }
            self.inner.work_ready.notify_all();
            self.inner.space_ready.notify_all();
            (first, abandoned)
        };

        let handles: Vec<_> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        let mut worker_died = false;
        for handle in handles {
            if handle.join().is_err() {
                worker_died = true;
            }
        }
        if worker_died {
            return Err(AcceptdError::WorkerPanicked);
        }
        if !first {
            return Ok(ShutdownReport::default());
        }

        debug!(?mode, abandoned, "worker pool stopped");
        Ok(ShutdownReport {
            completed: self.completed(),
            abandoned,
        })
    }

    fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    fn total_workers(&self) -> usize {
        self.inner.total
    }

    fn queue_capacity(&self) -> usize {
        self.inner.queue.capacity()
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        // Workers exit after their current task. Only shutdown() joins.
        {
            let _guard = self.inner.lock();
            let _ = self.inner.state.compare_exchange(
                RUNNING,
                STOPPING,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        self.inner.wake_all();
    }
}

/// Worker thread main loop.
fn worker_loop(inner: Arc<PoolInner>, worker_id: usize) {
    loop {
        if inner.state() == STOPPING {
            break;
        }

        if let Some(task) = inner.queue.pop() {
            inner.wake_submitter();
            inner.active.fetch_add(1, Ordering::Relaxed);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run()));
            inner.active.fetch_sub(1, Ordering::Relaxed);
            match outcome {
                Ok(()) => {
                    inner.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    inner.panicked.fetch_add(1, Ordering::Relaxed);
                    error!(worker_id, "request handler panicked; worker continues");
                }
            }
            continue;
        }

        // Queue looked empty. Re-check under the lock so a submit between
        // the pop and the wait cannot be missed.
        let guard = inner.lock();
        if !inner.queue.is_empty() {
            continue;
        }
        if inner.state() != RUNNING {
            break;
        }
        let _ = inner.work_ready.wait_timeout(guard, IDLE_WAIT);
    }
}
