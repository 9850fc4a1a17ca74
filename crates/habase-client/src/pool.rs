use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use habase_common::protocol::{HabaseError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::connection::Connection;

/// Connection pool configuration.
///
/// # Default Configuration
///
/// - `max_connections`: 10
/// - `acquire_timeout_ms`: 30000 (30 seconds)
///
/// # Example
///
/// ```rust
/// use habase_client::PoolConfig;
///
/// let config = PoolConfig {
///     max_connections: 4,
///     acquire_timeout_ms: 5000,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on connections handed out at once
    pub max_connections: usize,
    /// Maximum time to wait for a free connection in milliseconds
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 30000,
        }
    }
}

type IdleStack = Arc<Mutex<Vec<Connection>>>;

/// Bounded pool of whole [`Connection`]s.
///
/// Connections are created lazily, opened on creation and kept on a LIFO
/// idle stack between uses. At most `max_connections` are handed out at
/// once; callers beyond that wait up to `acquire_timeout_ms`.
///
/// # Example
///
/// ```rust,no_run
/// use habase_client::{ConnectionConfig, ConnectionPool, PoolConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ConnectionPool::new(PoolConfig::default(), ConnectionConfig::new("localhost", 9090))?;
///
/// let connection = pool.acquire().await?;
/// let tables = connection.tables().await?;
/// // Dropping the guard returns the connection to the pool.
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool {
    config: ConnectionConfig,
    pool_config: PoolConfig,
    semaphore: Arc<Semaphore>,
    idle: IdleStack,
}

impl ConnectionPool {
    /// Creates an empty pool. No connection is made until the first
    /// [`acquire`](Self::acquire).
    pub fn new(pool_config: PoolConfig, config: ConnectionConfig) -> Result<Self> {
        if pool_config.max_connections == 0 {
            return Err(HabaseError::Configuration(
                "'max_connections' must be greater than zero".to_string(),
            ));
        }
        config.validate()?;

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(pool_config.max_connections)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(pool_config.max_connections))),
            config,
            pool_config,
        })
    }

    pub fn max_connections(&self) -> usize {
        self.pool_config.max_connections
    }

    /// Connections currently parked in the pool
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Connections that could be handed out right now without waiting
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Takes a connection from the pool, creating one if none is idle.
    ///
    /// An idle connection with no live server is reopened before it is
    /// handed out.
    ///
    /// # Errors
    /// - `PoolTimeout` if every connection stays in use for the whole timeout
    /// - any error from creating or reopening the connection
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let timeout_ms = self.pool_config.acquire_timeout_ms;
        let permit = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| HabaseError::PoolTimeout(timeout_ms))?
        .map_err(|_| HabaseError::Connection("connection pool is closed".to_string()))?;

        let idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let connection = match idle {
            Some(connection) => {
                if connection.live_count() == 0 {
                    debug!("Reopening pooled connection with no live servers");
                    connection.open().await?;
                }
                connection
            }
            None => {
                debug!("Creating pooled connection");
                Connection::new(self.config.clone().with_autoconnect(true)).await?
            }
        };

        Ok(PooledConnection {
            connection: Some(connection),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }
}

/// A connection on loan from a [`ConnectionPool`]. Returned on drop.
pub struct PooledConnection {
    connection: Option<Connection>,
    idle: IdleStack,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only taken in drop.
        match &self.connection {
            Some(connection) => connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(connection);
        }
    }
}
