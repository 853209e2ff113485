//! acceptd: TCP acceptor server
//!
//! One control thread waits on an edge-triggered epoll instance for the
//! listening socket, drains accept() and hands every connection to a fixed
//! worker pool. The bundled handler echoes bytes back.
//!
//! Usage:
//!     cargo build --release -p acceptd
//!     ACCEPTD_PORT=9999 ./target/release/acceptd
//!
//! Configuration is read from `ACCEPTD_*` environment variables, logging
//! filter from `ACCEPTD_LOG` (default `info`).
//!
//! Test with:
//!     echo "hello" | nc -q1 localhost 9999
//!     for i in $(seq 1 100); do echo "ping $i" | nc -q1 localhost 9999 & done

mod echo;

use acceptd_core::config::ServerConfig;
use acceptd_core::env::env_get_millis;
use acceptd_core::error::{AcceptdError, Result};
use acceptd_core::pool::WorkerPool;
use acceptd_executor::{Acceptor, AcceptorConfig};
use acceptd_module::{EpollMultiplexer, FixedPool, TcpAcceptSocket};

use echo::EchoHandler;

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5000);

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Release);
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("ACCEPTD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// SIGINT/SIGTERM request a clean stop; SIGPIPE is ignored so a peer
/// vanishing mid-write fails the write instead of killing the process.
///
/// No SA_RESTART: the signal interrupts epoll_wait so the loop sees the
/// flag without waiting out its timeout.
fn install_signal_handlers() -> Result<()> {
    let stop = SigAction::new(
        SigHandler::Handler(handle_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());

    let installs = [
        (Signal::SIGINT, &stop),
        (Signal::SIGTERM, &stop),
        (Signal::SIGPIPE, &ignore),
    ];
    for (sig, action) in installs {
        // Safety: the handler only stores to an atomic.
        unsafe { signal::sigaction(sig, action) }.map_err(|errno| AcceptdError::Setup {
            op: "sigaction",
            source: std::io::Error::from_raw_os_error(errno as i32),
        })?;
    }
    Ok(())
}

fn run() -> Result<()> {
    let config = ServerConfig::from_env();
    config.validate()?;
    let idle_timeout = env_get_millis("ACCEPTD_IDLE_TIMEOUT_MS", DEFAULT_IDLE_TIMEOUT);

    let source = TcpAcceptSocket::from_config(&config)?;
    let port = source.port();
    let pool = FixedPool::new(&config.pool)?;
    let mux = EpollMultiplexer::new(config.max_events)?;

    println!("acceptd running on port {}", port);
    println!(
        "pool started with {} threads and queue size of {}",
        pool.total_workers(),
        pool.queue_capacity()
    );
    info!(
        host = %config.host,
        port,
        backlog = config.backlog,
        max_events = config.max_events,
        policy = ?config.pool.submit_policy,
        "configuration"
    );

    install_signal_handlers()?;

    let handler = Arc::new(EchoHandler::new(idle_timeout));
    let mut acceptor = Acceptor::new(source, mux, pool, handler, AcceptorConfig::from(&config))?;
    let stats = acceptor.stats();

    let outcome = acceptor.run(&SHUTDOWN);
    if let Err(e) = &outcome {
        error!(error = %e, "acceptor loop failed");
    }

    // Stop the pool on every path; the first error wins.
    let (pool, closed) = acceptor.finish();
    if let Err(e) = &closed {
        error!(error = %e, "closing listener failed");
    }
    info!(mode = ?config.pool.shutdown_mode, queued = pool.queued(), "shutting down worker pool");
    let stopped = pool.shutdown(config.pool.shutdown_mode);

    match &stopped {
        Ok(report) => info!(
            stats = %stats.snapshot(),
            completed = report.completed,
            abandoned = report.abandoned,
            panicked = pool.panicked(),
            "acceptd stopped"
        ),
        Err(e) => error!(error = %e, stats = %stats.snapshot(), "worker pool shutdown failed"),
    }
    outcome.and(closed).and(stopped.map(|_| ()))
}

fn main() {
    init_logging();

    if let Err(e) = run() {
        eprintln!("acceptd: {}", e);
        std::process::exit(1);
    }
}
