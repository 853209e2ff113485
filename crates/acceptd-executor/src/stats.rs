//! Acceptor counters.
//!
//! Written only by the control thread, read from anywhere (tests, the
//! periodic stats log, the final report at exit).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AcceptorStats {
    /// Multiplexer waits that returned (with or without events).
    pub(crate) wakeups: AtomicU64,
    /// accept() calls, including ones that returned would-block.
    pub(crate) accept_calls: AtomicU64,
    /// Connections accepted.
    pub(crate) accepted: AtomicU64,
    /// Connections handed to the pool.
    pub(crate) dispatched: AtomicU64,
    /// Connections refused by the pool and closed.
    pub(crate) rejected: AtomicU64,
    /// accept() failures other than would-block.
    pub(crate) accept_errors: AtomicU64,
    /// Ready events whose token was not ours.
    pub(crate) stray_events: AtomicU64,
}

impl AcceptorStats {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            wakeups: self.wakeups.load(Ordering::Relaxed),
            accept_calls: self.accept_calls.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            stray_events: self.stray_events.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `AcceptorStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub wakeups: u64,
    pub accept_calls: u64,
    pub accepted: u64,
    pub dispatched: u64,
    pub rejected: u64,
    pub accept_errors: u64,
    pub stray_events: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wakeups={} accept_calls={} accepted={} dispatched={} rejected={} accept_err={} stray={}",
            self.wakeups,
            self.accept_calls,
            self.accepted,
            self.dispatched,
            self.rejected,
            self.accept_errors,
            self.stray_events,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = AcceptorStats::default();
        AcceptorStats::bump(&stats.accepted);
        AcceptorStats::bump(&stats.accepted);
        AcceptorStats::bump(&stats.rejected);
        AcceptorStats::bump(&stats.stray_events);
        let snap = stats.snapshot();
        assert_eq!(snap.accepted, 2);
        assert_eq!(snap.rejected, 1);
        assert_eq!(snap.dispatched, 0);
        let line = snap.to_string();
        assert!(line.contains("accepted=2"));
        assert!(line.contains("stray=1"));
    }
}
