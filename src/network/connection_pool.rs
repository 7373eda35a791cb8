//! Bounded pool of connection permits

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of client connections served at once
#[derive(Clone)]
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
    max_connections: usize,
}

impl ConnectionPool {
    /// Create a new connection pool
    ///
    /// # Panics
    ///
    /// Panics if `max_connections` is 0
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        assert!(max_connections > 0, "max_connections must be > 0");

        Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Take a permit without waiting
    ///
    /// Returns `None` when every permit is held.
    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| ConnectionGuard { _permit: permit })
    }

    /// Connections currently holding a permit
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.semaphore.available_permits()
    }

    /// Get the maximum number of connections
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Refuse all further permits
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Permit released when the connection task ends
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
}
