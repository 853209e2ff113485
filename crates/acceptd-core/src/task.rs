//! Request handler contract and the unit of pool work.
//!
//! A `Task` pairs one handler with one `Connection`. The acceptor builds a
//! task per accepted connection and moves it into the pool; a worker calls
//! `run()`, which moves the connection into the handler. If the pool refuses
//! the task it is handed back whole, so the caller can still close the
//! connection.

use std::fmt;
use std::sync::Arc;

use crate::conn::Connection;

/// Protocol-level work on one accepted connection.
///
/// **Contract:**
/// - The handler owns the connection and is responsible for closing it
///   (dropping it is enough).
/// - It runs on a worker thread and may block; while it does, that worker
///   serves nothing else.
/// - It must not assume any ordering relative to other connections.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, conn: Connection);
}

impl<F> RequestHandler for F
where
    F: Fn(Connection) + Send + Sync + 'static,
{
    fn handle(&self, conn: Connection) {
        self(conn)
    }
}

pub struct Task {
    handler: Arc<dyn RequestHandler>,
    conn: Connection,
}

impl Task {
    pub fn new(handler: Arc<dyn RequestHandler>, conn: Connection) -> Self {
        Self { handler, conn }
    }

    /// The connection this task will hand to the handler.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Execute the handler. Consumes the task.
    pub fn run(self) {
        let Task { handler, conn } = self;
        handler.handle(conn);
    }

    /// Abandon the task and take the connection back.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("conn", &self.conn).finish()
    }
}
