//! Server and pool configuration

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BACKLOG, DEFAULT_MAX_EVENTS, DEFAULT_QUEUE_CAPACITY, DEFAULT_WAIT_TIMEOUT_MS,
    DEFAULT_WORKERS, MAX_WORKERS,
};
use crate::env::{env_get, env_get_bool, env_get_millis};
use crate::error::{AcceptdError, Result};
use crate::pool::{ShutdownMode, SubmitPolicy};

/// Worker pool sizing and policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads (default: 64)
    pub workers: usize,

    /// Maximum queued tasks before submit is refused (default: 2000)
    pub queue_capacity: usize,

    /// What submit does on a full queue (default: reject)
    pub submit_policy: SubmitPolicy,

    /// How the pool is stopped at exit (default: drain)
    pub shutdown_mode: ShutdownMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            submit_policy: SubmitPolicy::Reject,
            shutdown_mode: ShutdownMode::Drain,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of worker threads
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Set queue capacity
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    /// Set the full-queue policy
    pub fn submit_policy(mut self, policy: SubmitPolicy) -> Self {
        self.submit_policy = policy;
        self
    }

    /// Set the shutdown mode
    pub fn shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(AcceptdError::Config("workers must be at least 1".into()));
        }
        if self.workers > MAX_WORKERS {
            return Err(AcceptdError::Config(format!(
                "workers must be at most {}",
                MAX_WORKERS
            )));
        }
        if self.queue_capacity == 0 {
            return Err(AcceptdError::Config("queue capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Listener and acceptor-loop configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind (default: 0.0.0.0)
    pub host: Ipv4Addr,

    /// Port to bind; 0 lets the OS pick (default: 0)
    pub port: u16,

    /// listen() backlog depth (default: 256)
    pub backlog: i32,

    /// Maximum events taken from one multiplexer wait (default: 20)
    pub max_events: usize,

    /// Multiplexer wait timeout; bounds shutdown latency (default: 500ms)
    pub wait_timeout: Duration,

    /// How often the acceptor logs its counters; zero disables (default: 0)
    pub stats_interval: Duration,

    pub pool: PoolConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED,
            port: 0,
            backlog: DEFAULT_BACKLOG,
            max_events: DEFAULT_MAX_EVENTS,
            wait_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            stats_interval: Duration::ZERO,
            pool: PoolConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `ACCEPTD_*` environment variables over the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let submit_wait = env_get_millis("ACCEPTD_SUBMIT_WAIT_MS", Duration::ZERO);
        let shutdown_mode = if env_get_bool("ACCEPTD_DRAIN", true) {
            ShutdownMode::Drain
        } else {
            ShutdownMode::Immediate
        };

        Self {
            host: env_get("ACCEPTD_HOST", d.host),
            port: env_get("ACCEPTD_PORT", d.port),
            backlog: env_get("ACCEPTD_BACKLOG", d.backlog),
            max_events: env_get("ACCEPTD_MAX_EVENTS", d.max_events),
            wait_timeout: env_get_millis("ACCEPTD_WAIT_TIMEOUT_MS", d.wait_timeout),
            stats_interval: env_get_millis("ACCEPTD_STATS_INTERVAL_MS", d.stats_interval),
            pool: PoolConfig {
                workers: env_get("ACCEPTD_WORKERS", d.pool.workers),
                queue_capacity: env_get("ACCEPTD_QUEUE", d.pool.queue_capacity),
                submit_policy: SubmitPolicy::from_wait(submit_wait),
                shutdown_mode,
            },
        }
    }

    /// Set bind address
    pub fn host(mut self, host: Ipv4Addr) -> Self {
        self.host = host;
        self
    }

    /// Set port (0 = OS-assigned)
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set listen backlog
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set events per wait
    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    /// Set multiplexer wait timeout
    pub fn wait_timeout(mut self, d: Duration) -> Self {
        self.wait_timeout = d;
        self
    }

    /// Set stats logging interval
    pub fn stats_interval(mut self, d: Duration) -> Self {
        self.stats_interval = d;
        self
    }

    /// Set pool configuration
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.backlog <= 0 {
            return Err(AcceptdError::Config("backlog must be positive".into()));
        }
        if self.max_events == 0 {
            return Err(AcceptdError::Config("max_events must be at least 1".into()));
        }
        if self.wait_timeout.is_zero() {
            return Err(AcceptdError::Config("wait_timeout must be non-zero".into()));
        }
        self.pool.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.port, 0);
        assert_eq!(config.backlog, 256);
        assert_eq!(config.max_events, 20);
        assert_eq!(config.wait_timeout, Duration::from_millis(500));
        assert_eq!(config.pool.workers, 64);
        assert_eq!(config.pool.queue_capacity, 2000);
        assert_eq!(config.pool.submit_policy, SubmitPolicy::Reject);
        assert_eq!(config.pool.shutdown_mode, ShutdownMode::Drain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .host(Ipv4Addr::LOCALHOST)
            .port(8080)
            .max_events(64)
            .wait_timeout(Duration::from_millis(50))
            .pool(PoolConfig::new().workers(4).queue_capacity(8));
        assert_eq!(config.host, Ipv4Addr::LOCALHOST);
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_events, 64);
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.pool.queue_capacity, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(ServerConfig::new().max_events(0).validate().is_err());
        assert!(ServerConfig::new().backlog(0).validate().is_err());
        assert!(ServerConfig::new()
            .wait_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PoolConfig::new().workers(0).validate().is_err());
        assert!(PoolConfig::new().queue_capacity(0).validate().is_err());
    }

    #[test]
    fn test_validate_worker_cap() {
        let err = PoolConfig::new()
            .workers(MAX_WORKERS + 1)
            .validate()
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("workers"));
        assert!(PoolConfig::new().workers(MAX_WORKERS).validate().is_ok());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("ACCEPTD_HOST", "127.0.0.1");
        std::env::set_var("ACCEPTD_PORT", "9099");
        std::env::set_var("ACCEPTD_WORKERS", "8");
        std::env::set_var("ACCEPTD_QUEUE", "16");
        std::env::set_var("ACCEPTD_SUBMIT_WAIT_MS", "10");
        std::env::set_var("ACCEPTD_DRAIN", "off");

        let config = ServerConfig::from_env();

        for key in [
            "ACCEPTD_HOST",
            "ACCEPTD_PORT",
            "ACCEPTD_WORKERS",
            "ACCEPTD_QUEUE",
            "ACCEPTD_SUBMIT_WAIT_MS",
            "ACCEPTD_DRAIN",
        ] {
            std::env::remove_var(key);
        }

        assert_eq!(config.host, Ipv4Addr::LOCALHOST);
        assert_eq!(config.port, 9099);
        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.pool.queue_capacity, 16);
        assert_eq!(
            config.pool.submit_policy,
            SubmitPolicy::Block(Duration::from_millis(10))
        );
        assert_eq!(config.pool.shutdown_mode, ShutdownMode::Immediate);
        assert_eq!(config.backlog, 256);
    }
}
