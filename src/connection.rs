//! Capabilities the pool needs from a connection and its collaborators

use crate::errors::{BoxError, ErrorRef};

use async_trait::async_trait;
use std::future::Future;
use tokio::time::Instant;

/// A stateful connection to the backend service.
///
/// The pool never touches a connection's I/O surface; it only asks whether
/// the connection is still usable and closes it when it leaves the pool.
pub trait Connection: Send + 'static {
    /// Close the connection
    fn close(&mut self) -> Result<(), BoxError>;

    /// A non-`None` value means the connection is not usable anymore
    fn err(&self) -> Option<&ErrorRef>;
}

/// Produces freshly usable connections
#[async_trait]
pub trait Dial<C>: Send + Sync {
    async fn dial(&self) -> Result<C, BoxError>;
}

/// Adapter turning an async closure into a [`Dial`]
pub(crate) struct DialFn<F>(pub(crate) F);

#[async_trait]
impl<C, F, Fut> Dial<C> for DialFn<F>
where
    C: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<C, BoxError>> + Send,
{
    async fn dial(&self) -> Result<C, BoxError> {
        (self.0)().await
    }
}

/// On-borrow validation of an idle connection.
///
/// `idle_since` is the instant the connection was returned to the pool.
/// Returning an error closes the connection and the pool moves on to the
/// next idle entry or dials a new one.
#[async_trait]
pub trait HealthCheck<C>: Send + Sync {
    async fn check(&self, conn: &mut C, idle_since: Instant) -> Result<(), BoxError>;
}

/// Adapter turning a synchronous closure into a [`HealthCheck`]
pub(crate) struct HealthCheckFn<F>(pub(crate) F);

#[async_trait]
impl<C, F> HealthCheck<C> for HealthCheckFn<F>
where
    C: Send + 'static,
    F: Fn(&mut C, Instant) -> Result<(), BoxError> + Send + Sync,
{
    async fn check(&self, conn: &mut C, idle_since: Instant) -> Result<(), BoxError> {
        (self.0)(conn, idle_since)
    }
}
