//! # acceptd-core: Trait definitions for acceptd
//!
//! This crate defines the trait boundaries of the acceptor: where
//! connections come from, how readiness is observed, and who runs the
//! per-connection work. The acceptor loop (`acceptd-executor`) depends only
//! on these traits; default implementations live in `acceptd-module`.
//!
//! ## Modules
//!
//! - `conn` - Owned non-blocking connection
//! - `task` - Request handler contract and the pool's unit of work
//! - `source` - Connection source (listening socket) abstraction
//! - `multiplexer` - Readiness multiplexer abstraction
//! - `pool` - Worker pool contract (create, submit, shutdown)
//! - `config` - Server and pool configuration
//! - `env` - Environment variable helpers
//! - `error` - Error types

pub mod conn;
pub mod task;
pub mod source;
pub mod multiplexer;
pub mod pool;
pub mod config;
pub mod env;
pub mod error;

// Re-exports for convenience
pub use conn::Connection;
pub use task::{RequestHandler, Task};
pub use source::ConnectionSource;
pub use multiplexer::{Interest, Multiplexer, ReadyEvent, Token};
pub use pool::{Rejected, ShutdownMode, ShutdownReport, SubmitPolicy, WorkerPool};
pub use config::{PoolConfig, ServerConfig};
pub use error::{AcceptdError, RejectReason, Result};

/// Default sizing
pub mod constants {
    /// listen() backlog depth
    pub const DEFAULT_BACKLOG: i32 = 256;

    /// Events taken from one multiplexer wait
    pub const DEFAULT_MAX_EVENTS: usize = 20;

    /// Multiplexer wait timeout in milliseconds
    pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 500;

    /// Worker threads
    pub const DEFAULT_WORKERS: usize = 64;

    /// Pending tasks before submit is refused
    pub const DEFAULT_QUEUE_CAPACITY: usize = 2000;

    /// Upper bound on worker threads
    pub const MAX_WORKERS: usize = 1024;
}
