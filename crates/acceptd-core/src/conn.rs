//! Owned, non-blocking client connections.
//!
//! A `Connection` is created by exactly one accept and closed exactly once:
//! by the request handler when it is done, or by `Drop` if the connection
//! is discarded (backpressure, pool shutdown). It is not `Clone`; moving it
//! into a task is the ownership transfer.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};

#[derive(Debug)]
pub struct Connection {
    fd: OwnedFd,
    peer: Option<SocketAddr>,
}

impl Connection {
    /// Take ownership of an accepted descriptor.
    ///
    /// The descriptor must already be non-blocking.
    pub fn new(fd: OwnedFd, peer: Option<SocketAddr>) -> Self {
        Self { fd, peer }
    }

    /// Peer address as reported by accept, if known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Close now and report the close error, if any.
    ///
    /// Dropping a `Connection` also closes it but swallows the error.
    pub fn close(self) -> io::Result<()> {
        let raw = self.fd.into_raw_fd();
        let ret = unsafe { libc::close(raw) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Convert into a std `TcpStream` for handlers that want std I/O.
    ///
    /// The stream is still non-blocking; call `set_nonblocking(false)` for
    /// blocking reads.
    pub fn into_tcp_stream(self) -> TcpStream {
        TcpStream::from(self.fd)
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Set `O_NONBLOCK` on a descriptor (F_GETFL then F_SETFL).
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }
    let ret = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Whether `O_NONBLOCK` is set on a descriptor.
pub fn is_nonblocking(fd: BorrowedFd<'_>) -> io::Result<bool> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags & libc::O_NONBLOCK != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    fn pair() -> (Connection, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        (Connection::new(OwnedFd::from(a), None), b)
    }

    #[test]
    fn test_set_nonblocking() {
        let (conn, _peer) = pair();
        assert!(!is_nonblocking(conn.as_fd()).unwrap());
        set_nonblocking(conn.as_fd()).unwrap();
        assert!(is_nonblocking(conn.as_fd()).unwrap());
        // Idempotent.
        set_nonblocking(conn.as_fd()).unwrap();
        assert!(is_nonblocking(conn.as_fd()).unwrap());
    }

    #[test]
    fn test_close_is_observed_by_peer() {
        let (conn, mut peer) = pair();
        conn.close().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_drop_closes() {
        let (conn, mut peer) = pair();
        drop(conn);
        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_peer_addr_kept() {
        let (a, _b) = UnixStream::pair().unwrap();
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let conn = Connection::new(OwnedFd::from(a), Some(addr));
        assert_eq!(conn.peer_addr(), Some(addr));
    }
}
