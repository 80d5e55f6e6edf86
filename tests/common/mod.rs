//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use mdns_cors_proxy::config::ProxyConfig;
use mdns_cors_proxy::discovery::{ChannelSource, DiscoveryUpdate};
use mdns_cors_proxy::net::{Acceptor, Listener};
use mdns_cors_proxy::{Engine, ProxyError, Shutdown};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A running engine on an ephemeral loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<DiscoveryUpdate>,
    pub queries: Arc<AtomicUsize>,
    pub task: JoinHandle<Result<(), ProxyError>>,
}

impl TestProxy {
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }
}

/// Loopback test config; `tweak` adjusts it before the engine starts.
pub fn test_config(tweak: impl FnOnce(&mut ProxyConfig)) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.connect_timeout_secs = 2;
    tweak(&mut config);
    config
}

pub async fn start_proxy(tweak: impl FnOnce(&mut ProxyConfig)) -> TestProxy {
    let config = test_config(tweak);
    let tcp = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    start_proxy_on(tcp, config)
}

/// Run the engine on a caller-supplied acceptor.
pub fn start_proxy_on<A: Acceptor + 'static>(acceptor: A, config: ProxyConfig) -> TestProxy {
    let listener = Listener::from_listener(acceptor, config.listener.max_connections).unwrap();
    let (source, updates, queries) = ChannelSource::new();
    let engine = Engine::new(config, listener, source);
    let addr = engine.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let task = tokio::spawn(engine.run(shutdown.subscribe()));

    TestProxy {
        addr,
        shutdown,
        updates,
        queries,
        task,
    }
}

/// Read one HTTP message head plus `Content-Length` body bytes.
pub async fn read_http_message(stream: &mut TcpStream) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        if let Some(end) = find(&data, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + body_len {
                return data;
            }
        }
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            return data;
        }
        data.extend_from_slice(&buf[..n]);
    }
}

/// Read until EOF; a reset counts as EOF.
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut data = Vec::new();
    let _ = tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut data))
        .await
        .expect("connection was not closed in time");
    data
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Body of a response, everything after the first blank line.
pub fn body_of(response: &[u8]) -> &[u8] {
    let end = find(response, b"\r\n\r\n").expect("response has no header terminator");
    &response[end + 4..]
}

/// Start a one-shot origin server.
///
/// It reads one request, answers with `parts` (pausing between them so each
/// lands in its own read on the proxy side), then closes. The received
/// request bytes are delivered on the returned channel.
pub async fn start_origin(parts: &[&str]) -> (SocketAddr, oneshot::Receiver<Vec<u8>>) {
    let parts: Vec<Vec<u8>> = parts.iter().map(|p| p.as_bytes().to_vec()).collect();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_http_message(&mut socket).await;
        let _ = tx.send(request);
        for part in parts {
            let _ = socket.write_all(&part).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let _ = socket.shutdown().await;
    });

    (addr, rx)
}
