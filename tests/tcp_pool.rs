use esox_connpool::{
    BoxError, DialOptions, HealthCheck, LoggingConnection, Pool, PoolConfiguration, PoolError,
    PoolStats, TcpConnection, TcpDialer, TransportError,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Echo server that replies `+<line>` and hangs up on `QUIT`
async fn spawn_server(accepted: Arc<AtomicUsize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut socket = BufReader::new(socket);
                let mut line = String::new();
                while socket.read_line(&mut line).await.unwrap_or(0) > 0 {
                    if line.trim_end() == "QUIT" {
                        break;
                    }
                    let reply = format!("+{}\r\n", line.trim_end());
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
async fn sequential_requests_share_one_socket() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(Arc::clone(&accepted)).await;
    let pool = Pool::<TcpConnection>::with_dialer(
        TcpDialer::new(addr.to_string(), DialOptions::default()),
        PoolConfiguration::new().with_max_idle(2),
    )
    .unwrap();

    for n in 0..5 {
        let mut conn = pool.try_get().await.unwrap();
        let request = format!("GET {}", n);
        let reply = conn.get_mut().unwrap().post(request.as_bytes()).await.unwrap();
        assert_eq!(reply, format!("+GET {}", n).into_bytes());
        conn.close().unwrap();
    }

    let metrics = pool.get_metrics();
    assert_eq!(metrics.total_dialed, 1);
    assert_eq!(metrics.total_reused, 4);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats(), PoolStats { active: 1, idle: 1 });

    pool.close().unwrap();
    assert_eq!(pool.stats(), PoolStats { active: 0, idle: 0 });
}

#[tokio::test]
async fn connection_dropped_by_server_is_not_reused() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(Arc::clone(&accepted)).await;
    let pool = Pool::<TcpConnection>::with_dialer(
        TcpDialer::new(addr.to_string(), DialOptions::default()),
        PoolConfiguration::new(),
    )
    .unwrap();

    let mut conn = pool.try_get().await.unwrap();
    let err = conn.get_mut().unwrap().post(b"QUIT").await.unwrap_err();
    assert!(matches!(err, TransportError::Io(_)));
    assert!(conn.err().is_some());
    conn.close().unwrap();
    assert_eq!(pool.stats(), PoolStats { active: 0, idle: 0 });

    let mut fresh = pool.try_get().await.unwrap();
    assert_eq!(fresh.get_mut().unwrap().post(b"PING").await.unwrap(), b"+PING".to_vec());
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(pool.get_metrics().total_closed, 1);
}

#[tokio::test]
async fn unreachable_backend_surfaces_dial_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let pool = Pool::<TcpConnection>::with_dialer(
        TcpDialer::new(
            addr.to_string(),
            DialOptions::new().with_connect_timeout(Duration::from_secs(1)),
        ),
        PoolConfiguration::new().with_max_active(1),
    )
    .unwrap();

    let conn = pool.get().await;
    assert!(conn.is_failed());
    assert!(matches!(conn.get_ref(), Err(PoolError::Dial(_))));
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test]
async fn health_check_pings_idle_connections() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(Arc::clone(&accepted)).await;
    let pool = Pool::new(
        move || async move {
            let conn = TcpConnection::connect(addr, DialOptions::default()).await?;
            Ok::<_, BoxError>(LoggingConnection::new(conn, "echo"))
        },
        PoolConfiguration::new().with_health_checker(Ping),
    )
    .unwrap();

    let mut conn = pool.try_get().await.unwrap();
    conn.get_mut().unwrap().post(b"HELLO").await.unwrap();
    drop(conn);

    let mut again = pool.try_get().await.unwrap();
    assert_eq!(again.get_mut().unwrap().post(b"AGAIN").await.unwrap(), b"+AGAIN".to_vec());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(pool.get_metrics().health_check_failures, 0);
}

struct Ping;

#[async_trait::async_trait]
impl HealthCheck<LoggingConnection<TcpConnection>> for Ping {
    async fn check(
        &self,
        conn: &mut LoggingConnection<TcpConnection>,
        _idle_since: tokio::time::Instant,
    ) -> Result<(), BoxError> {
        let reply = conn.post(b"PING").await?;
        if reply != b"+PING" {
            return Err("unexpected PING reply".into());
        }
        Ok(())
    }
}
