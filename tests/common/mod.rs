//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use cluster_proxy::config::{RuleConfig, ServerConfig, UpstreamConfig};
use cluster_proxy::http::DISPATCH_DEADLINE;
use cluster_proxy::lifecycle::{Proxy, Shutdown};
use cluster_proxy::worker::WorkerLauncher;

/// Start a mock backend that answers every request with `"<name> <path>"`.
pub async fn start_named_backend(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(answer(socket, name));
                }
                Err(_) => break,
            }
        }
    });
    addr
}

async fn answer(mut socket: TcpStream, name: &'static str) {
    let mut buf = vec![0u8; 8192];
    let mut read = 0;
    while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf[read..]).await {
            Ok(0) | Err(_) => return,
            Ok(n) => read += n,
        }
        if read == buf.len() {
            return;
        }
    }

    let head = String::from_utf8_lossy(&buf[..read]);
    let path = head.split_whitespace().nth(1).unwrap_or("?").to_string();
    let body = format!("{} {}", name, path);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nX-Backend: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        name,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn upstream(id: &str, addr: SocketAddr) -> UpstreamConfig {
    UpstreamConfig {
        id: id.to_string(),
        url: Url::parse(&format!("http://{}", addr)).unwrap(),
    }
}

pub fn rule(path: &str, upstreams: &[&str]) -> RuleConfig {
    RuleConfig {
        path: path.to_string(),
        upstreams: upstreams.iter().map(|s| s.to_string()).collect(),
    }
}

/// Start an in-process proxy on an ephemeral port.
pub async fn start_proxy(config: ServerConfig) -> (SocketAddr, Shutdown) {
    start_proxy_with_deadline(config, DISPATCH_DEADLINE).await
}

pub async fn start_proxy_with_deadline(config: ServerConfig, deadline: Duration) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let proxy = Proxy::start_with_deadline(&config, &WorkerLauncher::InProcess, &shutdown, deadline).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = proxy.serve(listener).await;
    });
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
