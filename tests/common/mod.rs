//! Shared utilities for gateway integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use service_gateway::config::{GatewayConfig, ServiceConfig};
use service_gateway::{GatewayServer, Shutdown};

/// Read and discard the request head so the client never sees a reset
/// before it finishes writing.
async fn drain_request_head(socket: &mut TcpStream) {
    let mut buf = [0u8; 4096];
    let mut head = Vec::new();
    loop {
        match socket.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                head.extend_from_slice(&buf[..n]);
                if head.windows(4).any(|w| w == b"\r\n\r\n") || head.len() > 16_384 {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        401 => "401 Unauthorized",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Start a simple mock backend that returns a fixed 200 response.
#[allow(dead_code)]
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        drain_request_head(&mut socket).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a programmable mock backend whose status and body come from a
/// closure, so tests can script failure sequences and count calls.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        drain_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// A gateway config with sane test defaults: generous global limits so
/// unrelated tests never trip them, and a fixed signing secret.
#[allow(dead_code)]
pub fn test_config(services: Vec<ServiceConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.services = services;
    config.auth.jwt_secret = "integration-test-secret-0123456789".to_string();
    config.rate_limit.global.window_ms = 60_000;
    config.rate_limit.global.max = 10_000;
    config.rate_limit.per_user.window_ms = 60_000;
    config.rate_limit.per_user.max = 10_000;
    config
}

/// A service entry pointing at a local mock backend.
#[allow(dead_code)]
pub fn test_service(name: &str, backend: SocketAddr) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        url: format!("http://{backend}"),
        timeout_ms: 2_000,
        auth_required: false,
        admin_only: false,
        cache: false,
        cache_ttl_secs: None,
    }
}

/// Spawn the gateway on `addr` and give it a moment to start listening.
#[allow(dead_code)]
pub async fn start_gateway(config: GatewayConfig, addr: SocketAddr) -> Shutdown {
    let server = GatewayServer::new(config).expect("test config should validate");
    let listener = TcpListener::bind(addr).await.unwrap();
    let shutdown = Shutdown::new();
    let handle = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, handle).await;
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown
}

/// Non-pooled client so each request opens a fresh connection.
#[allow(dead_code)]
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
