//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use switchyard::config::{Algorithm, TimeoutConfig, TlsConfig};
use switchyard::load_balancer::Backend;
use switchyard::net::load_tls_config;
use switchyard::security::RateLimiter;
use switchyard::{Dispatcher, HttpServer, Registry, Shutdown};

/// Read one request head (and its body, if it has a Content-Length).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&buf).into_owned(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut remaining = content_length.saturating_sub(buf.len() - head_end);
    while remaining > 0 {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => remaining = remaining.saturating_sub(n),
        }
    }
    head
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        201 => "201 Created",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        _ => "200 OK",
    }
}

/// Start a programmable backend. The handler receives the raw request head
/// and returns the status and body to answer with.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let head = read_request(&mut socket).await;
                let (status, body) = f(head).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nX-Backend-Port: {}\r\nConnection: close\r\n\r\n{}",
                    status_line(status),
                    body.len(),
                    addr.port(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a backend that always answers 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// Start a backend that sends its headers and `first`, then waits for
/// `release` before sending `rest`.
pub async fn start_streaming_backend(
    first: &'static str,
    rest: &'static str,
    release: Arc<Notify>,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let release = release.clone();
            tokio::spawn(async move {
                read_request(&mut socket).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    first.len() + rest.len(),
                    first
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.flush().await;
                release.notified().await;
                let _ = socket.write_all(rest.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn backend(addr: SocketAddr) -> Backend {
    Backend::new(addr.to_string(), 1)
}

pub fn registry(algorithm: Algorithm, addrs: &[SocketAddr]) -> Arc<Registry> {
    let registry = Arc::new(Registry::new(algorithm));
    registry.replace(addrs.iter().copied().map(backend).collect());
    registry
}

pub fn dispatcher(registry: Arc<Registry>) -> Dispatcher {
    Dispatcher::new(registry, &TimeoutConfig::default())
}

/// Serve `dispatcher` on an ephemeral port.
pub async fn start_proxy(
    dispatcher: Dispatcher,
    limiter: Option<RateLimiter>,
) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server =
        HttpServer::with_dispatcher(dispatcher, limiter.map(Arc::new), Duration::from_secs(1));

    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (addr, shutdown)
}

/// Serve `dispatcher` over HTTPS with a freshly generated self-signed
/// certificate for `localhost`.
pub async fn start_tls_proxy(dispatcher: Dispatcher) -> (SocketAddr, Shutdown) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let dir = std::env::temp_dir();
    let stem = format!("switchyard-it-{}-{}", std::process::id(), next_cert_id());
    let cert_path = dir.join(format!("{stem}-cert.pem"));
    let key_path = dir.join(format!("{stem}-key.pem"));
    std::fs::write(&cert_path, certified.cert.pem()).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

    let addr = unused_addr().await;
    let tls = load_tls_config(&TlsConfig {
        bind_address: addr.to_string(),
        cert_path: cert_path.display().to_string(),
        key_path: key_path.display().to_string(),
    })
    .await
    .unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server = HttpServer::with_dispatcher(dispatcher, None, Duration::from_secs(1));
    tokio::spawn(async move {
        let _ = server.run_tls(addr, tls, rx).await;
    });

    (addr, shutdown)
}

fn next_cert_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Client for a proxy started with `start_tls_proxy`.
pub fn tls_client(proxy: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .resolve("localhost", proxy)
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Write a backend list to a per-test temp file.
pub fn write_backends(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "switchyard-it-{}-{name}.conf",
        std::process::id()
    ));
    std::fs::write(&path, content).unwrap();
    path
}

/// Poll until `host`'s in-flight count equals `expected`.
pub async fn wait_for_connections(
    registry: &Registry,
    host: &str,
    expected: usize,
) -> Option<usize> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let current = registry.connections(host);
        if current == Some(expected) || tokio::time::Instant::now() >= deadline {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
