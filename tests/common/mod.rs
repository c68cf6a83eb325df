//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use trickster::cache::{Cache, MemoryCache};
use trickster::config::{Config, OriginConfig};
use trickster::http::{AppState, HttpServer};
use trickster::lifecycle::Shutdown;
use trickster::observability::tracing::bootstrap;
use trickster::routing::OriginRouter;

/// Read the request head and return the request target (`/path?query`).
async fn read_target(socket: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head)
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("")
        .to_string()
}

/// Start a mock origin that answers `{name} {target}` for every request.
pub async fn start_echo_origin(name: &'static str) -> SocketAddr {
    start_programmable_origin(move |target| async move { (200, format!("{name} {target}")) }).await
}

/// Start a mock origin whose status and body come from `f(target)`.
pub async fn start_programmable_origin<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let target = read_target(&mut socket).await;
                        let (status, body) = f(target).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A config whose origins point at the given addresses.
pub fn config_for(origins: &[(&str, SocketAddr)], default_origin: &str) -> Config {
    let mut config = Config::default();
    config.origins = origins
        .iter()
        .map(|(name, addr)| {
            let origin = OriginConfig {
                origin_url: format!("http://{addr}"),
                timeout_secs: 5,
                ..OriginConfig::default()
            };
            (name.to_string(), origin)
        })
        .collect::<BTreeMap<_, _>>();
    config.main.default_origin = Some(default_origin.to_string());
    config
}

/// Start the proxy on an ephemeral port. It stops when `shutdown` triggers.
pub async fn start_proxy(config: Config, shutdown: &Shutdown) -> SocketAddr {
    let cache = Arc::new(MemoryCache::new());
    cache.connect().unwrap();
    let tracing = bootstrap(&config.tracing).unwrap();
    let router = Arc::new(OriginRouter::from_config(&config));
    let state = AppState::new(Arc::new(config), router, cache, tracing.context);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stop = shutdown.wait();
    tokio::spawn(async move {
        let _ = HttpServer::new(state).run(listener, stop).await;
    });
    addr
}

/// HTTP client that ignores proxy environment variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
