//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_connpool::{BoxError, Connection, ErrorRef, Pool, PoolConfiguration};
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
/// let pool = Pool::new(|| async { Ok::<_, BoxError>(Conn) }, PoolConfiguration::new()).unwrap();
///
/// let conn = pool.get().await;
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_dialed, 1);
/// assert_eq!(metrics.active_connections, 1);
///
/// conn.close().unwrap();
/// assert_eq!(pool.get_metrics().idle_connections, 1);
/// # }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct PoolMetrics {
    /// Connections dialed successfully
    pub total_dialed: usize,

    /// Dial attempts that failed
    pub dial_failures: usize,

    /// Checkouts served from the idle registry
    pub total_reused: usize,

    /// Connections returned to the idle registry
    pub total_returned: usize,

    /// Connections closed by the pool, for any reason
    pub total_closed: usize,

    /// Idle connections evicted for exceeding the idle timeout
    pub stale_evictions: usize,

    /// Idle connections evicted for exceeding the max lifetime
    pub lifetime_evictions: usize,

    /// Idle connections evicted to stay within `max_idle`
    pub overflow_evictions: usize,

    /// Idle connections rejected by the health check
    pub health_check_failures: usize,

    /// Checkouts refused with `PoolExhausted`
    pub exhausted_events: usize,

    /// Checkouts abandoned by cancellation or a wait timeout
    pub abandoned_waits: usize,

    /// Current active connections (idle + in use)
    pub active_connections: usize,

    /// Current idle connections
    pub idle_connections: usize,

    /// Active connection ceiling, zero when unbounded
    pub max_active: usize,

    /// Checked-out connections relative to the ceiling (0.0 to 1.0).
    /// Idle connections hold no slot and do not count.
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_dialed".to_string(), self.total_dialed.to_string());
        metrics.insert("dial_failures".to_string(), self.dial_failures.to_string());
        metrics.insert("total_reused".to_string(), self.total_reused.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_closed".to_string(), self.total_closed.to_string());
        metrics.insert("stale_evictions".to_string(), self.stale_evictions.to_string());
        metrics.insert("lifetime_evictions".to_string(), self.lifetime_evictions.to_string());
        metrics.insert("overflow_evictions".to_string(), self.overflow_evictions.to_string());
        metrics.insert("health_check_failures".to_string(), self.health_check_failures.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("abandoned_waits".to_string(), self.abandoned_waits.to_string());
        metrics.insert("active_connections".to_string(), self.active_connections.to_string());
        metrics.insert("idle_connections".to_string(), self.idle_connections.to_string());
        metrics.insert("max_active".to_string(), self.max_active.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        let gauges = [
            ("connpool_connections_active", "Current active connections", metrics.active_connections as f64),
            ("connpool_connections_idle", "Current idle connections", metrics.idle_connections as f64),
            ("connpool_utilization", "Checked-out connections relative to the ceiling", metrics.utilization),
        ];
        for (name, help, value) in gauges {
            Self::push_metric(&mut output, name, help, "gauge", &labels, &format!("{:.2}", value));
        }

        let counters = [
            ("connpool_dialed_total", "Connections dialed", metrics.total_dialed),
            ("connpool_dial_failures_total", "Failed dial attempts", metrics.dial_failures),
            ("connpool_reused_total", "Checkouts served from idle connections", metrics.total_reused),
            ("connpool_returned_total", "Connections returned to idle", metrics.total_returned),
            ("connpool_closed_total", "Connections closed by the pool", metrics.total_closed),
            ("connpool_evictions_stale_total", "Idle timeout evictions", metrics.stale_evictions),
            ("connpool_evictions_lifetime_total", "Max lifetime evictions", metrics.lifetime_evictions),
            ("connpool_evictions_overflow_total", "Max idle evictions", metrics.overflow_evictions),
            ("connpool_health_check_failures_total", "Health check rejections", metrics.health_check_failures),
            ("connpool_exhausted_total", "Checkouts refused at the ceiling", metrics.exhausted_events),
            ("connpool_abandoned_waits_total", "Checkouts abandoned by cancellation or timeout", metrics.abandoned_waits),
        ];
        for (name, help, value) in counters {
            Self::push_metric(&mut output, name, help, "counter", &labels, &value.to_string());
        }

        output
    }

    fn push_metric(output: &mut String, name: &str, help: &str, kind: &str, labels: &str, value: &str) {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} {}\n", name, kind));
        output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_dialed: AtomicUsize,
    pub dial_failures: AtomicUsize,
    pub total_reused: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub total_closed: AtomicUsize,
    pub stale_evictions: AtomicUsize,
    pub lifetime_evictions: AtomicUsize,
    pub overflow_evictions: AtomicUsize,
    pub health_check_failures: AtomicUsize,
    pub exhausted_events: AtomicUsize,
    pub abandoned_waits: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, active: usize, idle: usize, max_active: usize) -> PoolMetrics {
        let utilization = if max_active > 0 {
            active.saturating_sub(idle) as f64 / max_active as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_dialed: self.total_dialed.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            total_reused: self.total_reused.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            stale_evictions: self.stale_evictions.load(Ordering::Relaxed),
            lifetime_evictions: self.lifetime_evictions.load(Ordering::Relaxed),
            overflow_evictions: self.overflow_evictions.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            abandoned_waits: self.abandoned_waits.load(Ordering::Relaxed),
            active_connections: active,
            idle_connections: idle,
            max_active,
            utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let tracker = MetricsTracker::new();
        MetricsTracker::incr(&tracker.total_dialed);
        MetricsTracker::add(&tracker.total_closed, 3);

        let metrics = tracker.get_metrics(7, 2, 10);
        assert_eq!(metrics.total_dialed, 1);
        assert_eq!(metrics.total_closed, 3);
        assert!((metrics.utilization - 0.5).abs() < f64::EPSILON);

        let all_idle = tracker.get_metrics(10, 10, 10);
        assert_eq!(all_idle.utilization, 0.0);

        let unbounded = tracker.get_metrics(5, 2, 0);
        assert_eq!(unbounded.utilization, 0.0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = MetricsTracker::new().get_metrics(3, 1, 4);
        let mut tags = HashMap::new();
        tags.insert("service".to_string(), "queue".to_string());

        let output = MetricsExporter::export_prometheus(&metrics, "backend", Some(&tags));
        assert!(output.contains("# TYPE connpool_connections_active gauge"));
        assert!(output.contains("connpool_connections_active{pool=\"backend\",service=\"queue\"} 3.00"));
        assert!(output.contains("connpool_dialed_total{pool=\"backend\",service=\"queue\"} 0"));
    }

    #[test]
    fn test_export_map() {
        let metrics = MetricsTracker::new().get_metrics(2, 2, 0);
        let exported = metrics.export();
        assert_eq!(exported.get("active_connections").map(String::as_str), Some("2"));
        assert_eq!(exported.get("utilization").map(String::as_str), Some("0.00"));
    }
}
