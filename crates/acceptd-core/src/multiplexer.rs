//! Readiness multiplexer abstraction.
//!
//! A `Multiplexer` answers "which of these descriptors are ready?" for many
//! descriptors at once, without blocking per descriptor.
//!
//! # Implementors
//!
//! - `EpollMultiplexer` (default, Linux): one epoll instance.
//!
//! - Test doubles: scripted event sequences, used to check the acceptor's
//!   behaviour on empty wakeups and unknown tokens.

use std::os::fd::BorrowedFd;
use std::time::Duration;

use crate::error::Result;

/// Caller-chosen identifier returned with each ready event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub u64);

/// What to watch for and how to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
    /// Report transitions only (edge-triggered). The consumer must drain
    /// the condition fully on each report.
    pub edge: bool,
}

impl Interest {
    /// Readable, edge-triggered. The listener's registration.
    pub const READABLE_EDGE: Interest = Interest {
        readable: true,
        writable: false,
        edge: true,
    };

    /// Readable, level-triggered.
    pub const READABLE: Interest = Interest {
        readable: true,
        writable: false,
        edge: false,
    };
}

/// One ready descriptor, as reported by `wait()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub hangup: bool,
}

impl ReadyEvent {
    /// A plain readable event for `token`.
    pub fn readable(token: Token) -> Self {
        Self {
            token,
            readable: true,
            writable: false,
            error: false,
            hangup: false,
        }
    }
}

/// Scalable readiness notification.
///
/// **Contract:**
/// - `register()` is called once per descriptor. Registering the same
///   descriptor twice is an error, never a silent update.
/// - `wait()` is the only call that blocks. It returns `Ok(0)` on timeout
///   or on signal interruption; any other failure is fatal to the caller.
/// - Only the control thread uses a multiplexer (`&mut self`).
pub trait Multiplexer: Send {
    /// Start watching `fd`. Events for it carry `token`.
    fn register(&mut self, fd: BorrowedFd<'_>, token: Token, interest: Interest) -> Result<()>;

    /// Stop watching `fd`.
    fn deregister(&mut self, fd: BorrowedFd<'_>) -> Result<()>;

    /// Block until something is ready or `timeout` elapses.
    ///
    /// Clears `events`, fills it with at most `max_events` entries and
    /// returns how many were written.
    fn wait(
        &mut self,
        events: &mut Vec<ReadyEvent>,
        max_events: usize,
        timeout: Duration,
    ) -> Result<usize>;
}
