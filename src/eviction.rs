//! Eviction policies for idle and aged connections

use std::time::Duration;
use tokio::time::Instant;

/// Eviction policy for pooled connections
///
/// # Examples
///
/// ```
/// use esox_connpool::EvictionPolicy;
/// use std::time::Duration;
///
/// let policy = EvictionPolicy::from_limits(Some(Duration::from_secs(60)), None);
/// assert_eq!(policy, EvictionPolicy::IdleTimeout(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// No eviction
    #[default]
    None,

    /// Connections expire after being idle for the duration
    IdleTimeout(Duration),

    /// Connections expire a fixed duration after being dialed
    MaxLifetime(Duration),

    /// Idle timeout or max lifetime, whichever hits first
    Combined {
        idle_timeout: Duration,
        max_lifetime: Duration,
    },
}

impl EvictionPolicy {
    pub fn from_limits(idle_timeout: Option<Duration>, max_lifetime: Option<Duration>) -> Self {
        match (idle_timeout, max_lifetime) {
            (Some(idle_timeout), Some(max_lifetime)) => EvictionPolicy::Combined {
                idle_timeout,
                max_lifetime,
            },
            (Some(idle), None) => EvictionPolicy::IdleTimeout(idle),
            (None, Some(lifetime)) => EvictionPolicy::MaxLifetime(lifetime),
            (None, None) => EvictionPolicy::None,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match *self {
            EvictionPolicy::IdleTimeout(timeout) => Some(timeout),
            EvictionPolicy::Combined { idle_timeout, .. } => Some(idle_timeout),
            _ => None,
        }
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        match *self {
            EvictionPolicy::MaxLifetime(lifetime) => Some(lifetime),
            EvictionPolicy::Combined { max_lifetime, .. } => Some(max_lifetime),
            _ => None,
        }
    }

    /// Idle for strictly longer than the idle timeout
    pub fn is_stale(&self, idle_since: Instant, now: Instant) -> bool {
        self.idle_timeout()
            .is_some_and(|timeout| now.saturating_duration_since(idle_since) > timeout)
    }

    /// Reached the max lifetime; a connection must be younger to be reused
    pub fn is_expired(&self, created_at: Instant, now: Instant) -> bool {
        self.max_lifetime()
            .is_some_and(|lifetime| now.saturating_duration_since(created_at) >= lifetime)
    }
}

/// Rate limit for the amortized stale-connection scan
#[derive(Debug)]
pub(crate) struct PruneSchedule {
    interval: Duration,
    next_due: Instant,
}

impl PruneSchedule {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now,
        }
    }

    /// Returns true and schedules the next scan if one is due
    pub fn try_start(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.interval;
        true
    }
}

/// How many entries from the least recently used end one scan may examine
pub(crate) fn scan_budget(idle: usize) -> usize {
    idle.div_ceil(2)
}
