//! # acceptd-executor: The Acceptor Loop
//!
//! The acceptor is the server's only control thread. It owns the listening
//! socket and the multiplexer and runs this loop:
//!
//! ```text
//! while !shutdown {
//!     1. wait(max_events, timeout)      ← the one blocking point
//!     2. for each ready event:
//!          listener token? → drain: accept until would-block,
//!                            submit each connection to the pool,
//!                            close it if the pool refuses
//!          else            → ignore (stray)
//!     3. if a previous drain stopped on an accept failure → drain again
//!     4. stats tick
//! }
//! ```
//!
//! The acceptor is generic over all trait implementations. Swap the
//! source, multiplexer or pool and the loop doesn't change.
//!
//! Errors from the loop body go through one decision point: fatal errors
//! (`AcceptdError::is_fatal`) end `run()`, everything else is logged and
//! counted and the loop keeps serving.

pub mod stats;

pub use stats::{AcceptorStats, StatsSnapshot};

use acceptd_core::config::ServerConfig;
use acceptd_core::conn::Connection;
use acceptd_core::error::{AcceptdError, Result};
use acceptd_core::multiplexer::{Interest, Multiplexer, ReadyEvent, Token};
use acceptd_core::pool::WorkerPool;
use acceptd_core::source::{is_retryable_accept_error, ConnectionSource};
use acceptd_core::task::{RequestHandler, Task};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

/// Token under which the listening socket is registered.
pub const LISTENER_TOKEN: Token = Token(0);

/// Loop tuning, taken from `ServerConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptorConfig {
    /// Maximum events per wait.
    pub max_events: usize,
    /// Wait timeout; bounds how long a shutdown request goes unnoticed.
    pub wait_timeout: Duration,
    /// Stats log period; zero disables.
    pub stats_interval: Duration,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for AcceptorConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_events: config.max_events,
            wait_timeout: config.wait_timeout,
            stats_interval: config.stats_interval,
        }
    }
}

pub struct Acceptor<S, M, P>
where
    S: ConnectionSource,
    M: Multiplexer,
    P: WorkerPool,
{
    source: S,
    mux: M,
    pool: P,
    handler: Arc<dyn RequestHandler>,
    config: AcceptorConfig,
    stats: Arc<AcceptorStats>,
    events: Vec<ReadyEvent>,
    /// Set when a drain stopped on an accept failure with connections
    /// possibly still pending. Edge-triggering won't report them again.
    retry_drain: bool,
}

impl<S, M, P> Acceptor<S, M, P>
where
    S: ConnectionSource,
    M: Multiplexer,
    P: WorkerPool,
{
    /// Register the source with the multiplexer (readable, edge-triggered).
    pub fn new(
        source: S,
        mut mux: M,
        pool: P,
        handler: Arc<dyn RequestHandler>,
        config: AcceptorConfig,
    ) -> Result<Self> {
        mux.register(source.as_fd(), LISTENER_TOKEN, Interest::READABLE_EDGE)?;
        Ok(Self {
            source,
            mux,
            pool,
            handler,
            events: Vec::with_capacity(config.max_events),
            config,
            stats: Arc::new(AcceptorStats::default()),
            retry_drain: false,
        })
    }

    /// Run until `shutdown` is set or a fatal error occurs.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        info!(addr = %self.source.local_addr(), "acceptor loop started");
        let mut last_tick = Instant::now();

        while !shutdown.load(Ordering::Acquire) {
            self.cycle()?;

            if !self.config.stats_interval.is_zero()
                && last_tick.elapsed() >= self.config.stats_interval
            {
                last_tick = Instant::now();
                self.log_stats();
            }
        }

        info!(stats = %self.stats.snapshot(), "acceptor loop stopped");
        Ok(())
    }

    /// One wait + dispatch round.
    fn cycle(&mut self) -> Result<()> {
        let mut events = std::mem::take(&mut self.events);
        let waited = self
            .mux
            .wait(&mut events, self.config.max_events, self.config.wait_timeout);
        let result = match waited {
            Ok(n) => {
                AcceptorStats::bump(&self.stats.wakeups);
                self.dispatch_events(&events[..n.min(events.len())])
            }
            Err(e) => Err(e),
        };
        self.events = events;
        result
    }

    fn dispatch_events(&mut self, events: &[ReadyEvent]) -> Result<()> {
        let mut drained = false;
        for ev in events {
            if ev.token == LISTENER_TOKEN {
                if ev.error {
                    debug!("listener reported an error condition");
                }
                self.drain_accept()?;
                drained = true;
            } else {
                AcceptorStats::bump(&self.stats.stray_events);
                debug!(token = ev.token.0, "ignoring event for unknown token");
            }
        }
        if !drained && self.retry_drain {
            trace!("retrying drain after accept failure");
            self.drain_accept()?;
        }
        Ok(())
    }

    /// Accept until would-block, dispatching each connection.
    fn drain_accept(&mut self) -> Result<()> {
        self.retry_drain = false;
        loop {
            AcceptorStats::bump(&self.stats.accept_calls);
            match self.source.accept() {
                Ok(Some(conn)) => {
                    AcceptorStats::bump(&self.stats.accepted);
                    self.dispatch(conn)?;
                }
                Ok(None) => return Ok(()),
                Err(e) if is_retryable_accept_error(&e) => continue,
                Err(e) => {
                    AcceptorStats::bump(&self.stats.accept_errors);
                    self.retry_drain = true;
                    return self.on_error(AcceptdError::Accept(e));
                }
            }
        }
    }

    /// Hand one connection to the pool; close it if the pool refuses.
    fn dispatch(&self, conn: Connection) -> Result<()> {
        let task = Task::new(Arc::clone(&self.handler), conn);
        trace!(peer = ?task.connection().peer_addr(), "dispatching connection");
        match self.pool.submit(task) {
            Ok(()) => {
                AcceptorStats::bump(&self.stats.dispatched);
                Ok(())
            }
            Err(rejected) => {
                let reason = rejected.reason;
                let conn = rejected.task.into_connection();
                let peer = conn.peer_addr();
                if let Err(e) = conn.close() {
                    debug!(error = %e, "close after rejection failed");
                }
                AcceptorStats::bump(&self.stats.rejected);
                debug!(peer = ?peer, "connection closed on backpressure");
                self.on_error(AcceptdError::Backpressure(reason))
            }
        }
    }

    /// The single fatal/non-fatal decision point.
    fn on_error(&self, err: AcceptdError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(
            error = %err,
            queued = self.pool.queued(),
            active = self.pool.active_workers(),
            "per-connection failure; continuing"
        );
        Ok(())
    }

    fn log_stats(&self) {
        info!(
            stats = %self.stats.snapshot(),
            queued = self.pool.queued(),
            active = self.pool.active_workers(),
            workers = self.pool.total_workers(),
            "acceptor stats"
        );
    }

    /// Shared counters; stays valid after the acceptor is gone.
    pub fn stats(&self) -> Arc<AcceptorStats> {
        Arc::clone(&self.stats)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.source.local_addr()
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Deregister and close the listener; hand back the pool for shutdown.
    ///
    /// The pool comes back even when deregistration fails, so the caller
    /// can still stop it in the configured mode.
    pub fn finish(self) -> (P, Result<()>) {
        let Acceptor {
            source,
            mut mux,
            pool,
            ..
        } = self;
        let deregistered = mux.deregister(source.as_fd());
        drop(source);
        (pool, deregistered)
    }
}
