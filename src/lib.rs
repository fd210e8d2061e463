//! # esox_connpool
//!
//! Thread-safe pool of stateful network connections to a single backend.
//!
//! ## Features
//!
//! - Idle connection reuse, most recently used first
//! - Bounded active connections, failing fast or waiting in FIFO order
//! - Cancellable and time-limited waits
//! - Idle timeout, max lifetime and max idle eviction
//! - Health checks on borrow
//! - Automatic return of connections via RAII (Drop trait)
//! - Check-on-use error handles: `get` never fails outright
//! - Metrics, health status and Prometheus export
//! - Line-oriented TCP transport and a logging connection decorator
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use esox_connpool::{DialOptions, Pool, PoolConfiguration, TcpConnection, TcpDialer};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = PoolConfiguration::new()
//!     .with_max_idle(3)
//!     .with_max_active(16)
//!     .with_idle_timeout(Duration::from_secs(240))
//!     .with_wait(true);
//! let dialer = TcpDialer::new("127.0.0.1:4151", DialOptions::default());
//! let pool: Pool<TcpConnection> = Pool::with_dialer(dialer, config).unwrap();
//!
//! let mut conn = pool.get().await;
//! match conn.get_mut() {
//!     Ok(tcp) => {
//!         let reply = tcp.post(b"PING").await;
//!         println!("{:?}", reply);
//!     }
//!     Err(err) => eprintln!("no connection: {}", err),
//! }
//! // Back to the pool when `conn` goes out of scope
//! # }
//! ```

mod admission;
mod config;
mod connection;
mod errors;
mod eviction;
mod health;
mod idle;
mod logging;
mod metrics;
mod pool;
mod transport;

pub use config::PoolConfiguration;
pub use connection::{Connection, Dial, HealthCheck};
pub use errors::{BoxError, ErrorRef, PoolError, PoolResult, SharedError};
pub use eviction::EvictionPolicy;
pub use health::HealthStatus;
pub use logging::LoggingConnection;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{Pool, PoolStats, PooledConnection};
pub use transport::{DialOptions, TcpConnection, TcpDialer, TransportError};
