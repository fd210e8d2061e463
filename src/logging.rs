//! Logging decorator for connections

use crate::connection::Connection;
use crate::errors::{BoxError, ErrorRef};
use crate::transport::{TcpConnection, TransportError};

use std::fmt::Display;
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// Longest payload prefix written to the log
const CHOP: usize = 32;

/// Pass-through wrapper that logs the operations on a connection
///
/// # Examples
///
/// ```
/// use esox_connpool::{BoxError, Connection, ErrorRef, LoggingConnection};
///
/// struct Conn;
///
/// impl Connection for Conn {
///     fn close(&mut self) -> Result<(), BoxError> { Ok(()) }
///     fn err(&self) -> Option<&ErrorRef> { None }
/// }
///
/// let mut conn = LoggingConnection::new(Conn, "backend");
/// assert_eq!(conn.prefix(), "backend.");
/// assert!(conn.close().is_ok());
/// ```
#[derive(Debug)]
pub struct LoggingConnection<C> {
    inner: C,
    prefix: String,
}

impl<C> LoggingConnection<C> {
    pub fn new(inner: C, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() {
            prefix.push('.');
        }
        Self { inner, prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn log<T, E: Display>(&self, op: &str, args: &str, result: &Result<T, E>) {
        match result {
            Ok(_) => debug!("{}{}({}) -> ok", self.prefix, op, args),
            Err(err) => debug!(error = %err, "{}{}({}) -> error", self.prefix, op, args),
        }
    }
}

impl<C> Deref for LoggingConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<C> DerefMut for LoggingConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<C: Connection> Connection for LoggingConnection<C> {
    fn close(&mut self) -> Result<(), BoxError> {
        let result = self.inner.close();
        self.log("Close", "", &result);
        result
    }

    fn err(&self) -> Option<&ErrorRef> {
        self.inner.err()
    }
}

impl LoggingConnection<TcpConnection> {
    pub async fn send(&mut self, line: &[u8]) -> Result<(), TransportError> {
        let result = self.inner.send(line).await;
        self.log("Send", &format_payload(line), &result);
        result
    }

    pub async fn flush(&mut self) -> Result<(), TransportError> {
        let result = self.inner.flush().await;
        self.log("Flush", "", &result);
        result
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let result = self.inner.receive().await;
        let reply = result.as_deref().map(format_payload).unwrap_or_default();
        self.log("Receive", &reply, &result);
        result
    }

    pub async fn post(&mut self, line: &[u8]) -> Result<Vec<u8>, TransportError> {
        let result = self.inner.post(line).await;
        self.log("Post", &format_payload(line), &result);
        result
    }
}

/// Quote a payload, cut to [`CHOP`] bytes
fn format_payload(payload: &[u8]) -> String {
    let shown = &payload[..payload.len().min(CHOP)];
    let mut out = format!("{:?}", String::from_utf8_lossy(shown));
    if payload.len() > CHOP {
        out.push_str("...");
    }
    out
}
