//! Echo handler: the demo protocol served by the `acceptd` binary.

use acceptd_core::conn::Connection;
use acceptd_core::task::RequestHandler;

use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::{debug, trace};

const BUF_SIZE: usize = 4096;

/// Writes back every byte it reads until the peer closes.
///
/// Runs on a pool worker, so the connection is switched back to blocking
/// mode. An idle timeout keeps a silent peer from pinning a worker forever.
pub struct EchoHandler {
    idle_timeout: Option<Duration>,
}

impl EchoHandler {
    /// `Duration::ZERO` disables the idle timeout.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout: (!idle_timeout.is_zero()).then_some(idle_timeout),
        }
    }

    fn serve(&self, conn: Connection) -> io::Result<u64> {
        let mut stream = conn.into_tcp_stream();
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(self.idle_timeout)?;

        let mut buf = [0u8; BUF_SIZE];
        let mut echoed = 0u64;
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) => return Ok(echoed),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            stream.write_all(&buf[..n])?;
            echoed += n as u64;
        }
    }
}

impl RequestHandler for EchoHandler {
    fn handle(&self, conn: Connection) {
        let peer = conn.peer_addr();
        match self.serve(conn) {
            Ok(bytes) => trace!(peer = ?peer, bytes, "echo done"),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                debug!(peer = ?peer, "idle timeout, closing")
            }
            Err(e) => debug!(peer = ?peer, error = %e, "echo failed"),
        }
    }
}
