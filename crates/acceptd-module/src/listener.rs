//! `TcpAcceptSocket`: default `ConnectionSource` implementation.
//!
//! A non-blocking IPv4 listening socket. Setup follows the usual order:
//! socket → SO_REUSEADDR → bind → getsockname → listen → O_NONBLOCK. Any
//! failure is a fatal `Setup` error naming the failing call.
//!
//! The bound port is returned with the socket (`local_addr()`), so a
//! requested port of 0 resolves to the OS-assigned port without any shared
//! mutable state.

use acceptd_core::config::ServerConfig;
use acceptd_core::conn::{set_nonblocking, Connection};
use acceptd_core::error::{AcceptdError, Result};
use acceptd_core::source::ConnectionSource;

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use tracing::debug;

pub struct TcpAcceptSocket {
    fd: OwnedFd,
    local: SocketAddr,
}

impl TcpAcceptSocket {
    /// Bind and listen on `host:port` with the given backlog.
    pub fn bind(host: Ipv4Addr, port: u16, backlog: i32) -> Result<Self> {
        let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
        if raw < 0 {
            return Err(AcceptdError::setup("socket"));
        }
        // Safety: socket() returned a fresh descriptor we now own; every
        // early return below closes it through the OwnedFd.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let opt: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &opt as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(AcceptdError::setup("setsockopt(SO_REUSEADDR)"));
        }

        let addr = sockaddr_from_v4(SocketAddrV4::new(host, port));
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(AcceptdError::setup("bind"));
        }

        let mut bound: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(
                fd.as_raw_fd(),
                &mut bound as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            )
        };
        if ret < 0 {
            return Err(AcceptdError::setup("getsockname"));
        }
        let local = SocketAddr::V4(v4_from_sockaddr(&bound));

        if unsafe { libc::listen(fd.as_raw_fd(), backlog) } < 0 {
            return Err(AcceptdError::setup("listen"));
        }

        set_nonblocking(fd.as_fd()).map_err(|source| AcceptdError::Setup {
            op: "fcntl(O_NONBLOCK)",
            source,
        })?;

        debug!(%local, backlog, "listening socket ready");
        Ok(Self { fd, local })
    }

    /// Bind using the host, port and backlog of a `ServerConfig`.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::bind(config.host, config.port, config.backlog)
    }

    /// The resolved port.
    pub fn port(&self) -> u16 {
        self.local.port()
    }
}

impl ConnectionSource for TcpAcceptSocket {
    fn accept(&self) -> io::Result<Option<Connection>> {
        let mut peer: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let fd = unsafe {
            libc::accept4(
                self.fd.as_raw_fd(),
                &mut peer as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
                libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err);
        }
        // Safety: accept4 returned a fresh descriptor we now own.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        let peer = SocketAddr::V4(v4_from_sockaddr(&peer));
        Ok(Some(Connection::new(owned, Some(peer))))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

impl AsFd for TcpAcceptSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

fn sockaddr_from_v4(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
    raw.sin_family = libc::AF_INET as libc::sa_family_t;
    raw.sin_port = addr.port().to_be();
    raw.sin_addr.s_addr = u32::from(*addr.ip()).to_be();
    raw
}

fn v4_from_sockaddr(raw: &libc::sockaddr_in) -> SocketAddrV4 {
    SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(raw.sin_addr.s_addr)),
        u16::from_be(raw.sin_port),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use acceptd_core::conn::is_nonblocking;
    use std::net::TcpStream;

    #[test]
    fn test_port_zero_resolves() {
        let sock = TcpAcceptSocket::bind(Ipv4Addr::LOCALHOST, 0, 256).unwrap();
        let port = sock.port();
        assert!(port > 1024, "ephemeral port {port}");
        assert_eq!(sock.local_addr().port(), port);
        TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    }

    #[test]
    fn test_listener_is_nonblocking() {
        let sock = TcpAcceptSocket::bind(Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        assert!(is_nonblocking(sock.as_fd()).unwrap());
        // Nothing pending: returns immediately instead of blocking.
        assert!(sock.accept().unwrap().is_none());
    }

    #[test]
    fn test_accept_returns_nonblocking_connection() {
        let sock = TcpAcceptSocket::bind(Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        let client = TcpStream::connect(sock.local_addr()).unwrap();

        let conn = loop {
            if let Some(conn) = sock.accept().unwrap() {
                break conn;
            }
            std::thread::yield_now();
        };
        assert!(is_nonblocking(conn.as_fd()).unwrap());
        assert_eq!(conn.peer_addr(), Some(client.local_addr().unwrap()));
    }

    #[test]
    fn test_bind_in_use_is_setup_error() {
        let first = TcpAcceptSocket::bind(Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        let err = match TcpAcceptSocket::bind(Ipv4Addr::LOCALHOST, first.port(), 16) {
            Ok(_) => panic!("second bind on a listening port succeeded"),
            Err(e) => e,
        };
        assert!(err.is_fatal());
        assert_eq!(err.op(), Some("bind"));
    }

    #[test]
    fn test_sockaddr_conversion() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(10, 1, 2, 3), 8080);
        assert_eq!(v4_from_sockaddr(&sockaddr_from_v4(addr)), addr);
    }
}
