//! Bounded pool of SQLite connections.

use lightning_core::store::sqlite::register_functions;
use lightning_core::{LightningError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// At most `max` connections are in use at once; idle ones are reused.
pub struct ConnectionPool {
    path: PathBuf,
    flags: OpenFlags,
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
}

impl ConnectionPool {
    pub fn new(path: impl Into<PathBuf>, max: usize) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(max.max(1)),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Run `f` on a pooled connection on the blocking thread pool.
    pub async fn with_conn<F, T>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LightningError::Other("connection pool closed".into()))?;

        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let conn = pool.checkout()?;
            let result = f(&conn);
            pool.checkin(conn);
            result
        })
        .await
        .map_err(|e| LightningError::Other(format!("database task failed: {}", e)))?
    }

    fn checkout(&self) -> Result<Connection> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        match reused {
            Some(conn) => Ok(conn),
            None => {
                let conn = Connection::open_with_flags(&self.path, self.flags)?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                register_functions(&conn)?;
                Ok(conn)
            }
        }
    }

    fn checkin(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(conn);
    }
}
