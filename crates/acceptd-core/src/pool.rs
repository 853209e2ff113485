//! Worker pool abstraction.
//!
//! A `WorkerPool` runs submitted tasks on a fixed set of threads, fed from
//! a bounded queue. The acceptor is the only producer; workers are the
//! consumers.
//!
//! # Implementors
//!
//! - `FixedPool` (default): spawns N OS threads at creation time over a
//!   lock-free bounded queue. No dynamic scaling.

use std::fmt;
use std::time::Duration;

use crate::error::{RejectReason, Result};
use crate::task::Task;

/// A task the pool would not take, handed back to the submitter.
///
/// The caller still owns the connection inside and must close it.
pub struct Rejected {
    pub reason: RejectReason,
    pub task: Task,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task rejected: {}", self.reason)
    }
}

/// What `submit()` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPolicy {
    /// Refuse immediately with `QueueFull`.
    Reject,
    /// Wait up to the given duration for space, then refuse.
    ///
    /// Stalls the submitting thread; for the acceptor that is deliberate
    /// backpressure on the accept loop.
    Block(Duration),
}

impl SubmitPolicy {
    /// `Reject` for a zero wait, `Block(wait)` otherwise.
    pub fn from_wait(wait: Duration) -> Self {
        if wait.is_zero() {
            SubmitPolicy::Reject
        } else {
            SubmitPolicy::Block(wait)
        }
    }
}

/// How `shutdown()` treats work that has not started yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run every queued task, then stop.
    Drain,
    /// Finish in-flight tasks, drop queued ones (closing their connections).
    Immediate,
}

/// Outcome of a completed `shutdown()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that ran to completion over the pool's lifetime.
    pub completed: u64,
    /// Queued tasks dropped without running (only in `Immediate` mode).
    pub abandoned: u64,
}

/// Executes tasks on a pool of threads.
///
/// **Contract:**
/// - `submit()` is safe to call while workers drain the queue.
/// - `submit()` never loses a task: it is either queued or returned in
///   `Rejected`.
/// - After `shutdown()` starts, every `submit()` returns `ShuttingDown`.
/// - `shutdown()` is idempotent; the second call returns an empty report.
pub trait WorkerPool: Send + Sync {
    /// Queue a task for execution on a worker thread.
    fn submit(&self, task: Task) -> std::result::Result<(), Rejected>;

    /// Stop the pool. Blocks until every worker has exited.
    fn shutdown(&self, mode: ShutdownMode) -> Result<ShutdownReport>;

    /// Tasks waiting in the queue.
    fn queued(&self) -> usize;

    /// Workers currently running a task.
    fn active_workers(&self) -> usize;

    /// Total number of worker threads.
    fn total_workers(&self) -> usize;

    /// Maximum number of queued tasks.
    fn queue_capacity(&self) -> usize;
}
