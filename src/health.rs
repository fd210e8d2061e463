//! Health monitoring for connection pools

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connpool::HealthStatus;
///
/// let health = HealthStatus::new(2, 3, 4, false);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_connections, 2);
///
/// let saturated = HealthStatus::new(0, 4, 4, false);
/// assert!(!saturated.is_healthy());
/// assert_eq!(saturated.warning_count, 2);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Checked-out connections relative to the ceiling (0.0 to 1.0)
    pub utilization: f64,

    /// Idle connections count
    pub idle_connections: usize,

    /// Active connections count (idle + in use)
    pub active_connections: usize,

    /// Active connection ceiling, zero when unbounded
    pub max_active: usize,

    /// Whether the pool has been shut down
    pub closed: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(idle: usize, active: usize, max_active: usize, closed: bool) -> Self {
        // Idle connections hold no slot
        let in_use = active.saturating_sub(idle);
        let utilization = if max_active > 0 {
            in_use as f64 / max_active as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = !closed;

        if closed {
            warnings.push("Pool is closed".to_string());
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        // Every slot is checked out; the next get waits or fails
        if max_active > 0 && in_use >= max_active {
            warnings.push("Pool is exhausted".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_connections: idle,
            active_connections: active,
            max_active,
            closed,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
