//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use dualproxy::{Config, ConnectionManager, ProxyKind, Result};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestProxy {
    pub manager: Arc<ConnectionManager>,
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<()>>,
}

impl TestProxy {
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.expect("connect to proxy")
    }
}

pub fn test_config(kind: ProxyKind) -> Config {
    let mut config = Config::default();
    config.server.bind_host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.proxy_type = kind;
    config.server.connect_timeout = Duration::from_secs(2);
    config.server.poll_interval = Duration::from_millis(50);
    config.monitoring.management_api.enabled = false;
    config
}

/// Bind on an ephemeral loopback port and serve in the background
pub async fn start_proxy(kind: ProxyKind) -> TestProxy {
    let manager = Arc::new(ConnectionManager::new(Arc::new(test_config(kind))));
    let listener = manager.bind().await.expect("bind proxy");
    let addr = manager.local_addr().expect("bound address");

    let handle = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.serve(listener).await })
    };

    TestProxy { manager, addr, handle }
}

/// Echoes every byte back on each accepted connection
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Minimal origin server: answers each request with its own request line as
/// the body, then closes.
pub async fn spawn_http_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let text = String::from_utf8_lossy(&head);
                let request_line = text.split("\r\n").next().unwrap_or_default().to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    request_line.len(),
                    request_line
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    addr
}

/// A loopback port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Read until the peer closes
pub async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    timeout(IO_TIMEOUT, stream.read_to_end(&mut out))
        .await
        .expect("peer did not close in time")
        .expect("read failed");
    out
}

pub async fn read_exact_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    timeout(IO_TIMEOUT, stream.read_exact(&mut out))
        .await
        .expect("read timed out")
        .expect("read failed");
    out
}

/// Poll `check` until it holds or the deadline passes
pub async fn wait_until<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + IO_TIMEOUT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

/// SOCKS5 greeting plus CONNECT to an IPv4 target; returns the server reply
pub async fn socks5_connect_ipv4(stream: &mut TcpStream, target: SocketAddr) -> Vec<u8> {
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    assert_eq!(read_exact_n(stream, 2).await, vec![0x05, 0x00]);

    let ip = match target.ip() {
        std::net::IpAddr::V4(ip) => ip.octets(),
        other => panic!("expected an IPv4 target, got {}", other),
    };
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&ip);
    request.extend_from_slice(&target.port().to_be_bytes());
    stream.write_all(&request).await.unwrap();

    read_exact_n(stream, 10).await
}
