//! `EpollMultiplexer`: default `Multiplexer` implementation (Linux).
//!
//! One epoll instance, owned by the control thread. Tokens travel in the
//! event's `u64` data word. The event buffer is allocated once and grown
//! only if a caller asks for more events per wait than the capacity hint.

use acceptd_core::error::{AcceptdError, Result};
use acceptd_core::multiplexer::{Interest, Multiplexer, ReadyEvent, Token};

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::time::Duration;

pub struct EpollMultiplexer {
    epfd: OwnedFd,
    buf: Vec<libc::epoll_event>,
}

impl EpollMultiplexer {
    /// Create the epoll instance.
    ///
    /// `capacity` sizes the event buffer (events per `wait()`).
    pub fn new(capacity: usize) -> Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(AcceptdError::setup("epoll_create1"));
        }
        // Safety: epoll_create1 returned a fresh descriptor we now own.
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            epfd,
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
        })
    }

    fn ctl(&self, op: libc::c_int, fd: BorrowedFd<'_>, event: Option<libc::epoll_event>) -> io::Result<()> {
        let mut event = event;
        let ptr = match event.as_mut() {
            Some(ev) => ev as *mut libc::epoll_event,
            None => std::ptr::null_mut(),
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd.as_raw_fd(), ptr) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn interest_bits(interest: Interest) -> u32 {
    let mut bits = 0u32;
    if interest.readable {
        bits |= libc::EPOLLIN as u32;
    }
    if interest.writable {
        bits |= libc::EPOLLOUT as u32;
    }
    if interest.edge {
        bits |= libc::EPOLLET as u32;
    }
    bits
}

/// epoll takes milliseconds; round sub-millisecond timeouts up so a short
/// timeout never turns into a busy poll.
fn timeout_millis(timeout: Duration) -> libc::c_int {
    let ms = timeout.as_millis();
    if ms == 0 && !timeout.is_zero() {
        return 1;
    }
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}

impl Multiplexer for EpollMultiplexer {
    fn register(&mut self, fd: BorrowedFd<'_>, token: Token, interest: Interest) -> Result<()> {
        let event = libc::epoll_event {
            events: interest_bits(interest),
            u64: token.0,
        };
        self.ctl(libc::EPOLL_CTL_ADD, fd, Some(event))
            .map_err(|source| AcceptdError::Setup {
                op: "epoll_ctl(EPOLL_CTL_ADD)",
                source,
            })
    }

    fn deregister(&mut self, fd: BorrowedFd<'_>) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, None)
            .map_err(|source| AcceptdError::Resource {
                op: "epoll_ctl(EPOLL_CTL_DEL)",
                source,
            })
    }

    fn wait(
        &mut self,
        events: &mut Vec<ReadyEvent>,
        max_events: usize,
        timeout: Duration,
    ) -> Result<usize> {
        events.clear();
        let max = max_events.max(1);
        if self.buf.len() < max {
            self.buf.resize(max, libc::epoll_event { events: 0, u64: 0 });
        }

        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                self.buf.as_mut_ptr(),
                max.min(libc::c_int::MAX as usize) as libc::c_int,
                timeout_millis(timeout),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(AcceptdError::Resource {
                op: "epoll_wait",
                source: err,
            });
        }

        for raw in &self.buf[..n as usize] {
            // Copy out of the (possibly packed) kernel struct.
            let bits = raw.events;
            let data = raw.u64;
            events.push(ReadyEvent {
                token: Token(data),
                readable: bits & libc::EPOLLIN as u32 != 0,
                writable: bits & libc::EPOLLOUT as u32 != 0,
                error: bits & libc::EPOLLERR as u32 != 0,
                hangup: bits & (libc::EPOLLHUP | libc::EPOLLRDHUP) as u32 != 0,
            });
        }
        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_timeout_returns_empty() {
        let mut mux = EpollMultiplexer::new(4).unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        mux.register(a.as_fd(), Token(1), Interest::READABLE_EDGE).unwrap();

        let mut events = Vec::new();
        assert_eq!(mux.wait(&mut events, 4, SHORT).unwrap(), 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_readable_reports_token() {
        let mut mux = EpollMultiplexer::new(4).unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        mux.register(a.as_fd(), Token(42), Interest::READABLE_EDGE).unwrap();

        b.write_all(b"x").unwrap();
        let mut events = Vec::new();
        assert_eq!(mux.wait(&mut events, 4, Duration::from_secs(1)).unwrap(), 1);
        assert_eq!(events[0].token, Token(42));
        assert!(events[0].readable);
    }

    #[test]
    fn test_edge_triggered_reports_once() {
        let mut mux = EpollMultiplexer::new(4).unwrap();
        let (mut a, mut b) = UnixStream::pair().unwrap();
        mux.register(a.as_fd(), Token(1), Interest::READABLE_EDGE).unwrap();

        b.write_all(b"abc").unwrap();
        let mut events = Vec::new();
        assert_eq!(mux.wait(&mut events, 4, Duration::from_secs(1)).unwrap(), 1);
        // Not drained, but no new transition: nothing reported.
        assert_eq!(mux.wait(&mut events, 4, SHORT).unwrap(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(a.read(&mut buf).unwrap(), 3);
        b.write_all(b"d").unwrap();
        assert_eq!(mux.wait(&mut events, 4, Duration::from_secs(1)).unwrap(), 1);
    }

    #[test]
    fn test_level_triggered_repeats() {
        let mut mux = EpollMultiplexer::new(4).unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        mux.register(a.as_fd(), Token(1), Interest::READABLE).unwrap();

        b.write_all(b"abc").unwrap();
        let mut events = Vec::new();
        assert_eq!(mux.wait(&mut events, 4, Duration::from_secs(1)).unwrap(), 1);
        assert_eq!(mux.wait(&mut events, 4, SHORT).unwrap(), 1);
    }

    #[test]
    fn test_double_register_is_error() {
        let mut mux = EpollMultiplexer::new(4).unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        mux.register(a.as_fd(), Token(1), Interest::READABLE_EDGE).unwrap();
        let err = mux
            .register(a.as_fd(), Token(2), Interest::READABLE_EDGE)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_deregister_stops_events() {
        let mut mux = EpollMultiplexer::new(4).unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        mux.register(a.as_fd(), Token(1), Interest::READABLE_EDGE).unwrap();
        mux.deregister(a.as_fd()).unwrap();

        b.write_all(b"x").unwrap();
        let mut events = Vec::new();
        assert_eq!(mux.wait(&mut events, 4, SHORT).unwrap(), 0);
    }

    #[test]
    fn test_max_events_bounds_result() {
        let mut mux = EpollMultiplexer::new(1).unwrap();
        let mut pairs = Vec::new();
        for i in 0..3 {
            let (a, mut b) = UnixStream::pair().unwrap();
            mux.register(a.as_fd(), Token(i), Interest::READABLE).unwrap();
            b.write_all(b"x").unwrap();
            pairs.push((a, b));
        }
        let mut events = Vec::new();
        assert_eq!(mux.wait(&mut events, 2, Duration::from_secs(1)).unwrap(), 2);
        assert_eq!(mux.wait(&mut events, 8, Duration::from_secs(1)).unwrap(), 3);
    }

    #[test]
    fn test_timeout_millis_rounding() {
        assert_eq!(timeout_millis(Duration::ZERO), 0);
        assert_eq!(timeout_millis(Duration::from_micros(10)), 1);
        assert_eq!(timeout_millis(Duration::from_millis(500)), 500);
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX)), libc::c_int::MAX);
    }
}
