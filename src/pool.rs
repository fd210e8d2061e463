//! Core connection pool implementation

use crate::admission::AdmissionController;
use crate::config::PoolConfiguration;
use crate::connection::{Connection, Dial, DialFn, HealthCheck};
use crate::errors::{BoxError, ErrorRef, PoolError, PoolResult};
use crate::eviction::{EvictionPolicy, PruneSchedule, scan_budget};
use crate::health::HealthStatus;
use crate::idle::{IdleEntry, IdleRegistry};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

static CONNECTION_CLOSED: PoolError = PoolError::ConnectionClosed;

/// Snapshot of the pool's connection counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections dialed and not yet closed, idle or in use
    pub active: usize,

    /// Connections waiting in the idle registry
    pub idle: usize,
}

/// Mutable pool state, only touched under the pool lock.
///
/// `active` always equals in-use connections plus `idle.len()`.
struct PoolState<C> {
    closed: bool,
    active: usize,
    idle: IdleRegistry<C>,
    prune: PruneSchedule,
}

struct PoolShared<C> {
    state: Mutex<PoolState<C>>,
    admission: AdmissionController,
    dialer: Box<dyn Dial<C>>,
    health_check: Option<Arc<dyn HealthCheck<C>>>,
    eviction: EvictionPolicy,
    max_idle: usize,
    metrics: MetricsTracker,
}

/// Thread-safe pool of connections to a single backend.
///
/// Cloning a `Pool` yields another handle to the same pool.
///
/// # Examples
///
/// ```
/// use esox_connpool::{BoxError, Connection, ErrorRef, Pool, PoolConfiguration};
/// use std::time::Duration;
///
/// struct Conn;
///
/// impl Connection for Conn {
///     fn close(&mut self) -> Result<(), BoxError> { Ok(()) }
///     fn err(&self) -> Option<&ErrorRef> { None }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = PoolConfiguration::new()
///     .with_max_idle(3)
///     .with_idle_timeout(Duration::from_secs(240));
/// let pool = Pool::new(|| async { Ok::<_, BoxError>(Conn) }, config).unwrap();
///
/// {
///     let conn = pool.get().await;
///     assert!(conn.err().is_none());
///     // Returned to the pool when dropped
/// }
///
/// assert_eq!(pool.idle_count(), 1);
/// pool.close().unwrap();
/// assert_eq!(pool.active_count(), 0);
/// # }
/// ```
pub struct Pool<C> {
    shared: Arc<PoolShared<C>>,
}

impl<C> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connection> Pool<C> {
    /// Create a pool that dials connections with an async closure
    pub fn new<F, Fut>(dial: F, config: PoolConfiguration<C>) -> PoolResult<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, BoxError>> + Send + 'static,
    {
        Self::with_dialer(DialFn(dial), config)
    }

    /// Create a pool around a [`Dial`] implementation
    pub fn with_dialer<D>(dialer: D, config: PoolConfiguration<C>) -> PoolResult<Self>
    where
        D: Dial<C> + 'static,
    {
        config.validate()?;

        let state = PoolState {
            closed: false,
            active: 0,
            idle: IdleRegistry::new(),
            prune: PruneSchedule::new(config.prune_interval, Instant::now()),
        };

        let shared = PoolShared {
            state: Mutex::new(state),
            admission: AdmissionController::new(config.max_active, config.wait, config.wait_timeout),
            dialer: Box::new(dialer),
            health_check: config.health_check,
            eviction: EvictionPolicy::from_limits(config.idle_timeout, config.max_lifetime),
            max_idle: config.max_idle,
            metrics: MetricsTracker::new(),
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Get a connection.
    ///
    /// Never fails outright: if no connection can be produced, the returned
    /// handle carries the error and reports it on first use.
    pub async fn get(&self) -> PooledConnection<C> {
        self.try_get().await.unwrap_or_else(PooledConnection::failed)
    }

    /// Like [`Pool::get`], giving up with `Cancelled` if `cancel` fires
    /// while waiting for a free slot.
    ///
    /// A token that is already cancelled always refuses with `Cancelled`,
    /// whether or not a slot is free and whatever the wait mode.
    pub async fn get_with_cancel(&self, cancel: &CancellationToken) -> PooledConnection<C> {
        self.try_get_with_cancel(cancel)
            .await
            .unwrap_or_else(PooledConnection::failed)
    }

    /// Get a connection, surfacing failures immediately
    pub async fn try_get(&self) -> PoolResult<PooledConnection<C>> {
        self.checkout(None).await
    }

    /// Get a connection with a cancellable wait, surfacing failures
    /// immediately. Cancellation follows [`Pool::get_with_cancel`].
    pub async fn try_get_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> PoolResult<PooledConnection<C>> {
        self.checkout(Some(cancel)).await
    }

    /// Return a connection to the pool it came from.
    ///
    /// Failed handles are discarded silently.
    pub fn put(&self, mut conn: PooledConnection<C>, force_close: bool) -> PoolResult<()> {
        if conn.is_failed() {
            return Ok(());
        }
        conn.release(force_close)
    }

    /// Shut the pool down.
    ///
    /// Idle connections are closed now; connections in use are closed as
    /// they are returned. Blocked getters fail with `PoolClosed`.
    pub fn close(&self) -> PoolResult<()> {
        let drained = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            let drained = state.idle.take_all();
            state.active -= drained.len();
            drained
        };

        self.shared.admission.close();
        debug!(idle = drained.len(), "Closing connection pool");

        for entry in drained {
            let _ = self.shared.close_conn(entry.conn);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Active and idle counts, read together under the pool lock
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            active: state.active,
            idle: state.idle.len(),
        }
    }

    /// Number of connections dialed and not yet closed
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Number of idle connections
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let stats = self.stats();
        self.shared
            .metrics
            .get_metrics(stats.active, stats.idle, self.max_active())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        let (stats, closed) = {
            let state = self.shared.state.lock();
            let stats = PoolStats {
                active: state.active,
                idle: state.idle.len(),
            };
            (stats, state.closed)
        };
        HealthStatus::new(stats.idle, stats.active, self.max_active(), closed)
    }

    fn max_active(&self) -> usize {
        self.shared.admission.ceiling().unwrap_or(0)
    }

    async fn checkout(&self, cancel: Option<&CancellationToken>) -> PoolResult<PooledConnection<C>> {
        let shared = &self.shared;

        let permit = match shared.admission.admit(cancel).await {
            Ok(permit) => permit,
            Err(err) => {
                shared.record_refusal(&err);
                return Err(err);
            }
        };

        shared.prune_stale();

        let candidates = shared.state.lock().idle.len();
        for _ in 0..candidates {
            let Some(entry) = shared.pop_idle() else {
                break;
            };
            // Rejected, or dropped mid-check: the guard closes the connection
            let mut slot = SlotGuard::holding(shared, entry.conn);
            let reusable = match slot.conn.as_mut() {
                Some(conn) => shared.revalidate(conn, entry.idle_since, entry.created_at).await,
                None => false,
            };
            if !reusable {
                continue;
            }
            if let Some(conn) = slot.take() {
                MetricsTracker::incr(&shared.metrics.total_reused);
                trace!("Reusing idle connection");
                return Ok(PooledConnection::live(
                    Arc::clone(shared),
                    conn,
                    entry.created_at,
                    permit,
                ));
            }
        }

        {
            let mut state = shared.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            state.active += 1;
        }

        let slot = SlotGuard::new(shared);
        match shared.dialer.dial().await {
            Ok(conn) => {
                slot.take();
                MetricsTracker::incr(&shared.metrics.total_dialed);
                debug!("Dialed new connection");
                Ok(PooledConnection::live(
                    Arc::clone(shared),
                    conn,
                    Instant::now(),
                    permit,
                ))
            }
            Err(err) => {
                MetricsTracker::incr(&shared.metrics.dial_failures);
                let err = PoolError::dial(err);
                warn!(error = %err, "Failed to dial connection");
                Err(err)
            }
        }
    }
}

impl<C> PoolShared<C> {
    /// Drop one connection from the active count
    fn forget_slot(&self) {
        self.state.lock().active -= 1;
    }

    fn record_refusal(&self, err: &PoolError) {
        match err {
            PoolError::PoolExhausted => MetricsTracker::incr(&self.metrics.exhausted_events),
            PoolError::Cancelled | PoolError::Timeout(_) => {
                MetricsTracker::incr(&self.metrics.abandoned_waits)
            }
            _ => {}
        }
        debug!(error = %err, "Checkout refused");
    }
}

impl<C: Connection> PoolShared<C> {
    fn close_conn(&self, mut conn: C) -> PoolResult<()> {
        MetricsTracker::incr(&self.metrics.total_closed);
        conn.close().map_err(|err| {
            let err = PoolError::close(err);
            warn!(error = %err, "Error closing connection");
            err
        })
    }

    fn close_stale(&self, stale: Vec<C>) {
        if stale.is_empty() {
            return;
        }
        MetricsTracker::add(&self.metrics.stale_evictions, stale.len());
        debug!(count = stale.len(), "Evicting stale idle connections");
        for conn in stale {
            let _ = self.close_conn(conn);
        }
    }

    /// Amortized scan of the least recently used half of the registry
    fn prune_stale(&self) {
        if self.eviction.idle_timeout().is_none() {
            return;
        }
        let now = Instant::now();

        let stale = {
            let mut state = self.state.lock();
            if !state.prune.try_start(now) {
                return;
            }
            let mut stale = Vec::new();
            for _ in 0..scan_budget(state.idle.len()) {
                let expired = state
                    .idle
                    .back()
                    .is_some_and(|entry| self.eviction.is_stale(entry.idle_since, now));
                if !expired {
                    break;
                }
                if let Some(entry) = state.idle.pop_back() {
                    stale.push(entry.conn);
                }
            }
            state.active -= stale.len();
            stale
        };

        self.close_stale(stale);
    }

    /// Take the most recently idled entry.
    ///
    /// A stale front entry means everything behind it is stale too, so the
    /// whole registry is evicted and `None` returned.
    fn pop_idle(&self) -> Option<IdleEntry<C>> {
        let now = Instant::now();

        let stale = {
            let mut state = self.state.lock();
            let entry = state.idle.pop_front()?;
            if !self.eviction.is_stale(entry.idle_since, now) {
                return Some(entry);
            }
            let mut stale = vec![entry.conn];
            stale.extend(state.idle.take_all().into_iter().map(|entry| entry.conn));
            state.active -= stale.len();
            stale
        };

        self.close_stale(stale);
        None
    }

    /// Run the health check and lifetime limit against a popped connection.
    /// Closing a rejected connection is left to the caller's slot guard.
    async fn revalidate(&self, conn: &mut C, idle_since: Instant, created_at: Instant) -> bool {
        if let Some(check) = &self.health_check {
            if let Err(err) = check.check(conn, idle_since).await {
                let err = PoolError::unhealthy(err);
                MetricsTracker::incr(&self.metrics.health_check_failures);
                debug!(error = %err, "Closing idle connection");
                return false;
            }
        }

        if self.eviction.is_expired(created_at, Instant::now()) {
            MetricsTracker::incr(&self.metrics.lifetime_evictions);
            debug!(age = ?created_at.elapsed(), "Closing connection past its max lifetime");
            return false;
        }

        true
    }

    /// Return path for checked-out connections
    fn put(&self, conn: C, created_at: Instant, force_close: bool) -> PoolResult<()> {
        let broken = conn.err().is_some();

        let (to_close, overflow) = {
            let mut state = self.state.lock();
            if !state.closed && !broken && !force_close {
                state
                    .idle
                    .push_front(IdleEntry::new(conn, created_at, Instant::now()));
                if state.idle.len() > self.max_idle {
                    state.active -= 1;
                    (state.idle.pop_back().map(|entry| entry.conn), true)
                } else {
                    (None, false)
                }
            } else {
                state.active -= 1;
                (Some(conn), false)
            }
        };

        if overflow {
            MetricsTracker::incr(&self.metrics.overflow_evictions);
        }
        match to_close {
            None => {
                MetricsTracker::incr(&self.metrics.total_returned);
                trace!("Connection returned to idle");
                Ok(())
            }
            Some(conn) => self.close_conn(conn),
        }
    }
}

/// Keeps one active slot reserved while a connection is being checked or
/// dialed outside the lock.
///
/// Unless taken, dropping the guard frees the slot and closes the popped
/// connection it holds, so a rejected connection and a checkout future
/// dropped mid-check both leave the counts exact.
struct SlotGuard<'a, C: Connection> {
    shared: &'a PoolShared<C>,
    conn: Option<C>,
    armed: bool,
}

impl<'a, C: Connection> SlotGuard<'a, C> {
    fn new(shared: &'a PoolShared<C>) -> Self {
        Self {
            shared,
            conn: None,
            armed: true,
        }
    }

    fn holding(shared: &'a PoolShared<C>, conn: C) -> Self {
        Self {
            shared,
            conn: Some(conn),
            armed: true,
        }
    }

    /// Keep the slot and hand out the held connection, if any
    fn take(mut self) -> Option<C> {
        self.armed = false;
        self.conn.take()
    }
}

impl<C: Connection> Drop for SlotGuard<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.shared.forget_slot();
        if let Some(conn) = self.conn.take() {
            let _ = self.shared.close_conn(conn);
        }
    }
}

impl<C> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Pool")
            .field("active", &state.active)
            .field("idle", &state.idle.len())
            .field("closed", &state.closed)
            .field("max_active", &self.shared.admission.ceiling())
            .finish()
    }
}

/// A checked-out connection.
///
/// Closing or dropping the handle returns the connection to its pool. A
/// handle produced by a failed `get` holds only the error and returns it
/// from every operation.
pub struct PooledConnection<C: Connection> {
    state: Checkout<C>,
}

enum Checkout<C> {
    Live(LiveConnection<C>),
    Failed(PoolError),
    Released,
}

struct LiveConnection<C> {
    conn: C,
    created_at: Instant,
    pool: Arc<PoolShared<C>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<C: Connection> PooledConnection<C> {
    fn live(
        pool: Arc<PoolShared<C>>,
        conn: C,
        created_at: Instant,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            state: Checkout::Live(LiveConnection {
                conn,
                created_at,
                pool,
                permit,
            }),
        }
    }

    fn failed(err: PoolError) -> Self {
        Self {
            state: Checkout::Failed(err),
        }
    }

    /// Whether this handle only carries the error of a failed `get`
    pub fn is_failed(&self) -> bool {
        matches!(self.state, Checkout::Failed(_))
    }

    /// The error of a failed `get`, or the connection's own error
    pub fn err(&self) -> Option<&ErrorRef> {
        match &self.state {
            Checkout::Live(live) => live.conn.err(),
            Checkout::Failed(err) => Some(err as &ErrorRef),
            Checkout::Released => Some(&CONNECTION_CLOSED as &ErrorRef),
        }
    }

    pub fn get_ref(&self) -> PoolResult<&C> {
        match &self.state {
            Checkout::Live(live) => Ok(&live.conn),
            Checkout::Failed(err) => Err(err.clone()),
            Checkout::Released => Err(PoolError::ConnectionClosed),
        }
    }

    pub fn get_mut(&mut self) -> PoolResult<&mut C> {
        match &mut self.state {
            Checkout::Live(live) => Ok(&mut live.conn),
            Checkout::Failed(err) => Err(err.clone()),
            Checkout::Released => Err(PoolError::ConnectionClosed),
        }
    }

    /// When the underlying connection was dialed
    pub fn created_at(&self) -> Option<Instant> {
        match &self.state {
            Checkout::Live(live) => Some(live.created_at),
            _ => None,
        }
    }

    pub fn age(&self) -> Option<Duration> {
        self.created_at().map(|created_at| created_at.elapsed())
    }

    /// Return the connection to the pool
    pub fn close(mut self) -> PoolResult<()> {
        self.release(false)
    }

    /// Close the underlying connection instead of re-idling it
    pub fn discard(mut self) -> PoolResult<()> {
        self.release(true)
    }

    /// Take the connection out of the pool's bookkeeping for good
    pub fn detach(mut self) -> PoolResult<C> {
        match std::mem::replace(&mut self.state, Checkout::Released) {
            Checkout::Live(live) => {
                live.pool.forget_slot();
                Ok(live.conn)
            }
            Checkout::Failed(err) => Err(err),
            Checkout::Released => Err(PoolError::ConnectionClosed),
        }
    }

    fn release(&mut self, force_close: bool) -> PoolResult<()> {
        match std::mem::replace(&mut self.state, Checkout::Released) {
            Checkout::Live(live) => {
                let force_close = force_close || live.conn.err().is_some();
                let LiveConnection {
                    conn,
                    created_at,
                    pool,
                    permit,
                } = live;
                let result = pool.put(conn, created_at, force_close);
                // Free the slot only once the connection is back in the registry
                drop(permit);
                result
            }
            Checkout::Failed(err) => {
                self.state = Checkout::Failed(err.clone());
                Err(err)
            }
            Checkout::Released => Err(PoolError::ConnectionClosed),
        }
    }
}

impl<C: Connection> Connection for PooledConnection<C> {
    fn close(&mut self) -> Result<(), BoxError> {
        self.release(false).map_err(Into::into)
    }

    fn err(&self) -> Option<&ErrorRef> {
        PooledConnection::err(self)
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if matches!(self.state, Checkout::Live(_)) {
            if let Err(err) = self.release(false) {
                warn!(error = %err, "Error returning connection to pool");
            }
        }
    }
}

impl<C: Connection> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            Checkout::Live(live) => f
                .debug_struct("PooledConnection")
                .field("age", &live.created_at.elapsed())
                .field("healthy", &live.conn.err().is_none())
                .finish(),
            Checkout::Failed(err) => f.debug_tuple("PooledConnection::Failed").field(err).finish(),
            Checkout::Released => f.write_str("PooledConnection::Released"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestConn {
        id: usize,
        closes: Arc<AtomicUsize>,
        broken: Option<BoxError>,
    }

    impl Connection for TestConn {
        fn close(&mut self) -> Result<(), BoxError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn err(&self) -> Option<&ErrorRef> {
            self.broken.as_deref()
        }
    }

    fn test_pool(config: PoolConfiguration<TestConn>) -> (Pool<TestConn>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let ids = Arc::new(AtomicUsize::new(0));
        let dial_closes = Arc::clone(&closes);
        let pool = Pool::new(
            move || {
                let conn = TestConn {
                    id: ids.fetch_add(1, Ordering::SeqCst),
                    closes: Arc::clone(&dial_closes),
                    broken: None,
                };
                async move { Ok::<_, BoxError>(conn) }
            },
            config,
        )
        .unwrap();
        (pool, closes)
    }

    #[tokio::test]
    async fn test_reuses_most_recent_idle() {
        let (pool, _) = test_pool(PoolConfiguration::new());

        let first = pool.get().await;
        let second = pool.get().await;
        assert_eq!(first.get_ref().unwrap().id, 0);
        assert_eq!(second.get_ref().unwrap().id, 1);

        first.close().unwrap();
        second.close().unwrap();
        assert_eq!(pool.stats(), PoolStats { active: 2, idle: 2 });

        let again = pool.get().await;
        assert_eq!(again.get_ref().unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_broken_connection_is_closed_on_return() {
        let (pool, closes) = test_pool(PoolConfiguration::new());

        let mut conn = pool.get().await;
        conn.get_mut().unwrap().broken = Some("reset by peer".into());
        assert!(conn.err().is_some());

        conn.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats(), PoolStats { active: 0, idle: 0 });
    }

    #[tokio::test]
    async fn test_discard_forces_close() {
        let (pool, closes) = test_pool(PoolConfiguration::new());

        pool.get().await.discard().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_handle_reports_error_everywhere() {
        let (pool, _) = test_pool(PoolConfiguration::new().with_max_active(1));

        let _held = pool.get().await;
        let mut failed = pool.get().await;

        assert!(failed.is_failed());
        assert_eq!(
            failed.err().map(|e| e.to_string()),
            Some("connection pool exhausted".to_string())
        );
        assert!(matches!(failed.get_mut(), Err(PoolError::PoolExhausted)));
        assert!(matches!(Connection::close(&mut failed), Err(_)));
        assert!(matches!(failed.close(), Err(PoolError::PoolExhausted)));
        assert_eq!(pool.active_count(), 1);
    }

    #[tokio::test]
    async fn test_put_discards_failed_handle() {
        let (pool, _) = test_pool(PoolConfiguration::new().with_max_active(1));

        let held = pool.get().await;
        let failed = pool.get().await;
        assert!(pool.put(failed, false).is_ok());

        pool.put(held, false).unwrap();
        assert_eq!(pool.stats(), PoolStats { active: 1, idle: 1 });
    }

    #[tokio::test]
    async fn test_released_handle_reports_closed() {
        let (pool, _) = test_pool(PoolConfiguration::new());

        let mut conn = pool.get().await;
        Connection::close(&mut conn).unwrap();
        assert!(matches!(conn.get_ref(), Err(PoolError::ConnectionClosed)));
        assert!(matches!(conn.close(), Err(PoolError::ConnectionClosed)));
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_detach_leaves_pool_bookkeeping() {
        let (pool, closes) = test_pool(PoolConfiguration::new().with_max_active(1));

        let conn = pool.get().await.detach().unwrap();
        assert_eq!(conn.id, 0);
        assert_eq!(pool.active_count(), 0);

        let next = pool.get().await;
        assert_eq!(next.get_ref().unwrap().id, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_metrics_and_health() {
        let (pool, _) = test_pool(PoolConfiguration::new().with_max_active(2));

        let a = pool.get().await;
        let b = pool.get().await;
        let health = pool.get_health_status();
        assert!(!health.is_healthy());
        assert_eq!(health.active_connections, 2);

        drop(a);
        drop(b);
        let metrics = pool.get_metrics();
        assert_eq!(metrics.total_dialed, 2);
        assert_eq!(metrics.total_returned, 2);
        assert_eq!(metrics.idle_connections, 2);
        assert_eq!(metrics.utilization, 0.0);

        let idle_at_ceiling = pool.get_health_status();
        assert!(idle_at_ceiling.is_healthy());
        assert!(idle_at_ceiling.warnings.is_empty());

        let output = pool.export_metrics_prometheus("test", None);
        assert!(output.contains("connpool_connections_idle{pool=\"test\"} 2.00"));
    }
}
