//! Where connections come from.
//!
//! The acceptor registers the source's descriptor with its multiplexer and
//! calls `accept()` only after a readiness report for it. The default
//! implementation is a listening TCP socket; tests substitute sources that
//! fail on demand.

use std::io;
use std::net::SocketAddr;
use std::os::fd::AsFd;

use crate::conn::Connection;

pub trait ConnectionSource: AsFd + Send {
    /// Accept one pending connection without blocking.
    ///
    /// `Ok(None)` means nothing is pending (would-block): the readiness
    /// report has been fully drained. Returned connections are non-blocking.
    fn accept(&self) -> io::Result<Option<Connection>>;

    /// The address actually bound (port resolved if 0 was requested).
    fn local_addr(&self) -> SocketAddr;
}

/// Errors after which `accept()` may be retried immediately.
pub fn is_retryable_accept_error(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINTR) | Some(libc::ECONNABORTED)
    ) || err.kind() == io::ErrorKind::Interrupted
}
