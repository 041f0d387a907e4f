//! Bounded connection pool that runs blocking queries off the runtime.
//!
//! At most `size` connections exist at any time. Idle connections are reused
//! last-in first-out; a connection whose query failed is dropped instead of
//! being returned, so a broken socket never poisons later requests.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::value::{Row, Value};

/// Errors from pool checkout and query execution.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Opening a new connection failed.
    #[error("failed to connect to Firebird: {0}")]
    Connect(String),

    /// The server rejected or failed the query.
    #[error("Firebird query failed: {0}")]
    Query(String),

    /// The pool was closed.
    #[error("connection pool is closed")]
    Closed,

    /// A pool must allow at least one connection.
    #[error("pool size must be at least 1")]
    InvalidSize,

    /// The blocking worker panicked or was cancelled.
    #[error("blocking query worker failed: {0}")]
    Worker(String),
}

/// Opens connections and runs queries on them.
///
/// Both methods block; the pool calls them from the blocking thread pool.
pub trait Connector: Send + Sync + 'static {
    /// Connection handle type.
    type Connection: Send + 'static;

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Connect`] when the server is unreachable or
    /// rejects the credentials.
    fn connect(&self) -> Result<Self::Connection, PoolError>;

    /// Run one statement with positional parameters and fetch all rows.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Query`] on any statement failure.
    fn query(
        &self,
        conn: &mut Self::Connection,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, PoolError>;
}

struct Inner<C: Connector> {
    connector: C,
    idle: Mutex<Vec<C::Connection>>,
}

impl<C: Connector> Inner<C> {
    fn take_idle(&self) -> Option<C::Connection> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    fn put_idle(&self, conn: C::Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, PoolError> {
        let mut conn = match self.take_idle() {
            Some(conn) => conn,
            None => {
                debug!("opening new Firebird connection");
                self.connector.connect()?
            }
        };

        match self.connector.query(&mut conn, sql, params) {
            Ok(rows) => {
                self.put_idle(conn);
                Ok(rows)
            }
            Err(e) => {
                warn!(error = %e, "discarding Firebird connection after failed query");
                Err(e)
            }
        }
    }
}

/// Cloneable handle to a bounded connection pool.
pub struct Pool<C: Connector> {
    inner: Arc<Inner<C>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            permits: Arc::clone(&self.permits),
            size: self.size,
        }
    }
}

impl<C: Connector> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size)
            .field("available", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool allowing at most `size` concurrent connections.
    ///
    /// No connection is opened until the first query.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSize`] when `size` is zero.
    pub fn new(connector: C, size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                connector,
                idle: Mutex::new(Vec::with_capacity(size)),
            }),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Maximum number of concurrent connections.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of open connections currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run a query on a pooled connection.
    ///
    /// Waits for a free slot when all connections are busy.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] when the pool is closed, a connection cannot be
    /// opened, or the query fails.
    pub async fn query(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Vec<Row>, PoolError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let inner = Arc::clone(&self.inner);
        let sql = sql.into();

        tokio::task::spawn_blocking(move || {
            let result = inner.run(&sql, &params);
            drop(permit);
            result
        })
        .await
        .map_err(|e| PoolError::Worker(e.to_string()))?
    }

    /// Open one connection and park it, proving the database is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Connect`] when the connection cannot be opened.
    pub async fn check(&self) -> Result<(), PoolError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let inner = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || {
            let conn = inner.connector.connect()?;
            inner.put_idle(conn);
            drop(permit);
            Ok::<(), PoolError>(())
        })
        .await
        .map_err(|e| PoolError::Worker(e.to_string()))?
    }

    /// Close the pool: pending and future queries fail with
    /// [`PoolError::Closed`] and idle connections are dropped.
    pub fn close(&self) {
        self.permits.close();
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
