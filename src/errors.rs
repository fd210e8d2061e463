//! Error types for the connection pool

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type accepted from dialers, health checks and connection close calls
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shareable error, so a failed handle can report the same error repeatedly
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Borrowed view of a connection's current error
pub type ErrorRef = dyn std::error::Error + Send + Sync + 'static;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("get on closed pool")]
    PoolClosed,

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Timed out waiting for a connection after {0:?}")]
    Timeout(Duration),

    #[error("dial failed: {0}")]
    Dial(SharedError),

    #[error("connection failed health check: {0}")]
    Unhealthy(SharedError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("error closing connection: {0}")]
    Close(SharedError),

    #[error("invalid pool configuration: {0}")]
    InvalidConfiguration(&'static str),
}

impl PoolError {
    pub(crate) fn dial(err: BoxError) -> Self {
        PoolError::Dial(Arc::from(err))
    }

    pub(crate) fn unhealthy(err: BoxError) -> Self {
        PoolError::Unhealthy(Arc::from(err))
    }

    pub(crate) fn close(err: BoxError) -> Self {
        PoolError::Close(Arc::from(err))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
