//! acceptd error types.
//!
//! Every failure in the acceptor is one of two kinds:
//!
//! - **fatal**: setup or resource failures. There is nothing to preserve
//!   (no clients yet, or the control loop cannot make progress), so the
//!   process reports the failing operation and exits non-zero.
//! - **per-connection**: accept failures and dispatch backpressure. These
//!   are isolated to one connection and never stop the control loop.
//!
//! [`AcceptdError::is_fatal`] is the one place that decision is made.

use std::fmt;
use std::io;

use thiserror::Error;

/// Why a worker pool refused a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The bounded queue is at capacity.
    QueueFull,
    /// The pool has been told to stop.
    ShuttingDown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "queue full"),
            Self::ShuttingDown => write!(f, "pool shutting down"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AcceptdError {
    /// socket/bind/listen/fcntl/epoll setup failed.
    #[error("{op}: {source}")]
    Setup {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    /// A resource the control loop depends on failed at runtime
    /// (multiplexer wait, worker spawn).
    #[error("{op}: {source}")]
    Resource {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    /// Configuration rejected by `validate()`.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// accept() failed with something other than would-block.
    #[error("accept: {0}")]
    Accept(#[source] io::Error),
    /// The pool refused a connection; it was closed.
    #[error("dispatch rejected: {0}")]
    Backpressure(RejectReason),
    /// A worker thread panicked outside of a task and could not be joined.
    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl AcceptdError {
    /// Build a `Setup` error from the current `errno`.
    pub fn setup(op: &'static str) -> Self {
        Self::Setup {
            op,
            source: io::Error::last_os_error(),
        }
    }

    /// Build a `Resource` error from the current `errno`.
    pub fn resource(op: &'static str) -> Self {
        Self::Resource {
            op,
            source: io::Error::last_os_error(),
        }
    }

    /// True if the process cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Setup { .. } | Self::Resource { .. } | Self::Config(_) | Self::WorkerPanicked => {
                true
            }
            Self::Accept(_) | Self::Backpressure(_) => false,
        }
    }

    /// Name of the failing operation, when there is one.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Self::Setup { op, .. } | Self::Resource { op, .. } => Some(*op),
            Self::Accept(_) => Some("accept"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AcceptdError>;
