//! Line-oriented TCP transport
//!
//! Frames are CRLF-terminated lines. Replies are handed back as raw line
//! bytes; interpreting them is up to the caller.

use crate::connection::{Connection, Dial};
use crate::errors::{BoxError, ErrorRef};

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(&'static str),

    #[error("connection closed")]
    Closed,
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

/// Socket options applied when dialing
///
/// # Examples
///
/// ```
/// use esox_connpool::DialOptions;
/// use std::time::Duration;
///
/// let options = DialOptions::new()
///     .with_connect_timeout(Duration::from_secs(1))
///     .with_read_timeout(Duration::from_millis(500));
///
/// assert_eq!(options.connect_timeout, Some(Duration::from_secs(1)));
/// assert_eq!(options.max_line_length, 4096);
/// ```
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Longest accepted reply line, terminator included
    pub max_line_length: usize,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            read_buffer_size: 4096,
            write_buffer_size: 4096,
            max_line_length: 4096,
        }
    }
}

impl DialOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    pub fn with_max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }
}

/// Buffered TCP connection speaking CRLF-terminated lines.
///
/// Any I/O, timeout or framing failure is fatal: the error is kept as the
/// connection's error and the socket is dropped, so the pool closes the
/// connection instead of re-idling it.
pub struct TcpConnection {
    stream: Option<BufStream<TcpStream>>,
    err: Option<TransportError>,
    peer: Option<SocketAddr>,
    options: DialOptions,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, options: DialOptions) -> Self {
        let peer = stream.peer_addr().ok();
        let stream =
            BufStream::with_capacity(options.read_buffer_size, options.write_buffer_size, stream);
        Self {
            stream: Some(stream),
            err: None,
            peer,
            options,
        }
    }

    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        options: DialOptions,
    ) -> Result<Self, TransportError> {
        let stream = with_deadline(options.connect_timeout, TcpStream::connect(addr)).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, options))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Buffer one line; nothing is written until [`TcpConnection::flush`]
    pub async fn send(&mut self, line: &[u8]) -> Result<(), TransportError> {
        let limit = self.options.write_timeout;
        let stream = self.stream()?;
        let result = with_deadline(limit, async {
            stream.write_all(line).await?;
            stream.write_all(b"\r\n").await
        })
        .await;
        self.fatal(result)
    }

    pub async fn flush(&mut self) -> Result<(), TransportError> {
        let limit = self.options.write_timeout;
        let stream = self.stream()?;
        let result = with_deadline(limit, stream.flush()).await;
        self.fatal(result)
    }

    /// Read one reply line without its terminator
    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let limit = self.options.read_timeout;
        let max_line = self.options.max_line_length as u64;
        let stream = self.stream()?;

        let mut line = Vec::new();
        let result = with_deadline(limit, (&mut *stream).take(max_line).read_until(b'\n', &mut line))
            .await
            .and_then(|read| parse_line(line, read, max_line));
        self.fatal(result)
    }

    /// Send a line, flush and wait for the reply
    pub async fn post(&mut self, line: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.send(line).await?;
        self.flush().await?;
        self.receive().await
    }

    fn stream(&mut self) -> Result<&mut BufStream<TcpStream>, TransportError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        self.stream.as_mut().ok_or(TransportError::Closed)
    }

    fn fatal<T>(&mut self, result: Result<T, TransportError>) -> Result<T, TransportError> {
        if let Err(err) = &result {
            if self.err.is_none() {
                self.err = Some(err.clone());
                // Dropping the stream shuts the socket so the peer sees EOF
                self.stream = None;
            }
        }
        result
    }
}

fn parse_line(mut line: Vec<u8>, read: usize, max_line: u64) -> Result<Vec<u8>, TransportError> {
    if read == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    if line.last() != Some(&b'\n') {
        if line.len() as u64 >= max_line {
            return Err(TransportError::Protocol("long response line"));
        }
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    line.pop();
    if line.pop() != Some(b'\r') {
        return Err(TransportError::Protocol("bad response line terminator"));
    }
    if line.is_empty() {
        return Err(TransportError::Protocol("short response line"));
    }
    Ok(line)
}

async fn with_deadline<T, F>(limit: Option<Duration>, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout(limit))?
            .map_err(TransportError::from),
        None => fut.await.map_err(TransportError::from),
    }
}

impl Connection for TcpConnection {
    fn close(&mut self) -> Result<(), BoxError> {
        if self.err.is_none() {
            self.err = Some(TransportError::Closed);
        }
        self.stream = None;
        Ok(())
    }

    fn err(&self) -> Option<&ErrorRef> {
        self.err.as_ref().map(|err| err as &ErrorRef)
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("peer", &self.peer)
            .field("err", &self.err)
            .finish()
    }
}

/// Dials [`TcpConnection`]s to a fixed address
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
    options: DialOptions,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>, options: DialOptions) -> Self {
        Self {
            addr: addr.into(),
            options,
        }
    }
}

#[async_trait]
impl Dial<TcpConnection> for TcpDialer {
    async fn dial(&self) -> Result<TcpConnection, BoxError> {
        Ok(TcpConnection::connect(self.addr.as_str(), self.options.clone()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;

    /// Answers every line with `+<line>` and a custom reply for `RAW <bytes>`
    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut socket = BufReader::new(socket);
                    let mut line = String::new();
                    while socket.read_line(&mut line).await.unwrap_or(0) > 0 {
                        let request = line.trim_end().to_string();
                        let reply = match request.strip_prefix("RAW ") {
                            Some(raw) => raw.replace("\\n", "\n"),
                            None => format!("+{}\r\n", request),
                        };
                        if socket.get_mut().write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                        line.clear();
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_post_round_trip() {
        let addr = spawn_server().await;
        let mut conn = TcpConnection::connect(addr, DialOptions::default()).await.unwrap();

        assert_eq!(conn.post(b"PING").await.unwrap(), b"+PING".to_vec());

        conn.send(b"A").await.unwrap();
        conn.send(b"B").await.unwrap();
        conn.flush().await.unwrap();
        assert_eq!(conn.receive().await.unwrap(), b"+A".to_vec());
        assert_eq!(conn.receive().await.unwrap(), b"+B".to_vec());
        assert!(conn.err().is_none());
        assert_eq!(conn.peer_addr(), Some(addr));
    }

    #[tokio::test]
    async fn test_bad_terminator_is_fatal() {
        let addr = spawn_server().await;
        let mut conn = TcpConnection::connect(addr, DialOptions::default()).await.unwrap();

        let err = conn.post(b"RAW oops\\n").await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol("bad response line terminator")));
        assert!(conn.err().is_some());
        assert!(matches!(conn.post(b"PING").await, Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_long_line_is_rejected() {
        let addr = spawn_server().await;
        let options = DialOptions::new().with_max_line_length(8);
        let mut conn = TcpConnection::connect(addr, options).await.unwrap();

        let err = conn.post(b"0123456789").await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol("long response line")));
    }

    #[test]
    fn test_parse_line_framing() {
        assert_eq!(parse_line(b"OK\r\n".to_vec(), 4, 64).unwrap(), b"OK".to_vec());
        assert!(matches!(
            parse_line(b"\r\n".to_vec(), 2, 64),
            Err(TransportError::Protocol("short response line"))
        ));
        assert!(matches!(parse_line(Vec::new(), 0, 64), Err(TransportError::Io(_))));
        assert!(matches!(parse_line(b"partial".to_vec(), 7, 64), Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_close_marks_connection_unusable() {
        let addr = spawn_server().await;
        let mut conn = TcpDialer::new(addr.to_string(), DialOptions::default())
            .dial()
            .await
            .unwrap();

        Connection::close(&mut conn).unwrap();
        assert!(conn.err().is_some());
        assert!(matches!(conn.send(b"PING").await, Err(TransportError::Closed)));
        assert!(Connection::close(&mut conn).is_ok());
    }
}
