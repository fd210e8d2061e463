//! Pool configuration options

use crate::connection::{HealthCheck, HealthCheckFn};
use crate::errors::{BoxError, PoolError, PoolResult};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for connection pool behavior
///
/// # Examples
///
/// ```
/// use esox_connpool::PoolConfiguration;
/// use std::time::Duration;
///
/// struct Conn;
///
/// let config = PoolConfiguration::<Conn>::new()
///     .with_max_idle(3)
///     .with_max_active(10)
///     .with_idle_timeout(Duration::from_secs(240))
///     .with_wait(true);
///
/// assert_eq!(config.max_idle, 3);
/// assert_eq!(config.max_active, 10);
/// assert_eq!(config.idle_timeout, Some(Duration::from_secs(240)));
/// assert!(config.wait);
/// ```
pub struct PoolConfiguration<C> {
    /// Maximum number of idle connections kept in the pool
    pub max_idle: usize,

    /// Maximum number of connections allocated by the pool at a given time.
    /// Zero means no limit.
    pub max_active: usize,

    /// Close connections after remaining idle for this duration
    pub idle_timeout: Option<Duration>,

    /// Close connections older than this on borrow
    pub max_lifetime: Option<Duration>,

    /// Block in `get` at the `max_active` limit instead of failing
    pub wait: bool,

    /// Upper bound on a blocking wait
    pub wait_timeout: Option<Duration>,

    /// Minimum time between two stale-connection scans
    pub prune_interval: Duration,

    /// Validation run on idle connections before they are handed out
    pub health_check: Option<Arc<dyn HealthCheck<C>>>,
}

impl<C> Default for PoolConfiguration<C> {
    fn default() -> Self {
        Self {
            max_idle: 16,
            max_active: 0,
            idle_timeout: None,
            max_lifetime: None,
            wait: false,
            wait_timeout: None,
            prune_interval: Duration::ZERO,
            health_check: None,
        }
    }
}

impl<C> Clone for PoolConfiguration<C> {
    fn clone(&self) -> Self {
        Self {
            max_idle: self.max_idle,
            max_active: self.max_active,
            idle_timeout: self.idle_timeout,
            max_lifetime: self.max_lifetime,
            wait: self.wait,
            wait_timeout: self.wait_timeout,
            prune_interval: self.prune_interval,
            health_check: self.health_check.clone(),
        }
    }
}

impl<C> fmt::Debug for PoolConfiguration<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("max_idle", &self.max_idle)
            .field("max_active", &self.max_active)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .field("wait", &self.wait)
            .field("wait_timeout", &self.wait_timeout)
            .field("prune_interval", &self.prune_interval)
            .field("health_check", &self.health_check.is_some())
            .finish()
    }
}

impl<C: Send + 'static> PoolConfiguration<C> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of idle connections
    pub fn with_max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    /// Set the active connection ceiling, zero for unbounded
    pub fn with_max_active(mut self, count: usize) -> Self {
        self.max_active = count;
        self
    }

    /// Set the idle timeout. A zero duration disables it.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = non_zero(timeout);
        self
    }

    /// Set the maximum connection lifetime. A zero duration disables it.
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = non_zero(lifetime);
        self
    }

    /// Wait for a free slot instead of failing with `PoolExhausted`
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Bound the blocking wait; implies `with_wait(true)`
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.wait_timeout = Some(timeout);
        self
    }

    /// Set the minimum interval between stale-connection scans
    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }

    /// Validate idle connections with a synchronous closure before reuse
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::PoolConfiguration;
    /// use std::time::Duration;
    ///
    /// struct Conn {
    ///     alive: bool,
    /// }
    ///
    /// let config = PoolConfiguration::<Conn>::new().with_health_check(|conn, idle_since| {
    ///     if idle_since.elapsed() < Duration::from_secs(60) || conn.alive {
    ///         Ok(())
    ///     } else {
    ///         Err("connection went away".into())
    ///     }
    /// });
    ///
    /// assert!(config.health_check.is_some());
    /// ```
    pub fn with_health_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&mut C, Instant) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.health_check = Some(Arc::new(HealthCheckFn(check)));
        self
    }

    /// Validate idle connections with an async [`HealthCheck`] implementation
    pub fn with_health_checker<H>(mut self, checker: H) -> Self
    where
        H: HealthCheck<C> + 'static,
    {
        self.health_check = Some(Arc::new(checker));
        self
    }

    /// Reject combinations the pool cannot honor
    pub fn validate(&self) -> PoolResult<()> {
        if let Some(timeout) = self.wait_timeout {
            if timeout.is_zero() {
                return Err(PoolError::InvalidConfiguration("wait timeout must be non-zero"));
            }
            if !self.wait {
                return Err(PoolError::InvalidConfiguration(
                    "wait timeout requires blocking wait",
                ));
            }
        }
        Ok(())
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}
