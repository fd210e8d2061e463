// esox_connpool demo
// Pools line-oriented TCP connections to a local echo listener.
// Set RUST_LOG=debug to watch dials, reuse and eviction.

use esox_connpool::{BoxError, DialOptions, LoggingConnection, Pool, PoolConfiguration, TcpConnection};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    println!("=== esox_connpool demo ===");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut socket = BufReader::new(socket);
                let mut line = String::new();
                while socket.read_line(&mut line).await.unwrap_or(0) > 0 {
                    let reply = format!("+{}\r\n", line.trim_end());
                    if socket.get_mut().write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                    line.clear();
                }
            });
        }
    });

    let config = PoolConfiguration::new()
        .with_max_idle(2)
        .with_max_active(4)
        .with_idle_timeout(Duration::from_secs(60))
        .with_wait(true);
    let options = DialOptions::new().with_connect_timeout(Duration::from_secs(1));
    let pool = Pool::new(
        move || {
            let options = options.clone();
            async move {
                let conn = TcpConnection::connect(addr, options).await?;
                Ok::<_, BoxError>(LoggingConnection::new(conn, "echo"))
            }
        },
        config,
    )?;

    let mut workers = Vec::new();
    for id in 0..8 {
        let pool = pool.clone();
        workers.push(tokio::spawn(async move {
            let mut conn = pool.get().await;
            match conn.get_mut() {
                Ok(echo) => match echo.post(format!("hello {}", id).as_bytes()).await {
                    Ok(reply) => println!("  worker {}: {}", id, String::from_utf8_lossy(&reply)),
                    Err(err) => println!("  worker {}: transport error: {}", id, err),
                },
                Err(err) => println!("  worker {}: no connection: {}", id, err),
            }
        }));
    }
    for worker in workers {
        worker.await?;
    }

    let stats = pool.stats();
    println!("  Active: {}, Idle: {}", stats.active, stats.idle);
    for (key, value) in pool.export_metrics() {
        println!("    {}: {}", key, value);
    }

    pool.close()?;
    println!("  Active after close: {}", pool.active_count());
    Ok(())
}
