//! End-to-end behaviour of the engine over loopback sockets.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use mdns_cors_proxy::discovery::DiscoveryUpdate;
use mdns_cors_proxy::http::response::PREFLIGHT_RESPONSE;

mod common;
use common::*;

#[tokio::test]
async fn forwards_rewritten_request_and_injects_cors() {
    let (origin, received) =
        start_origin(&["HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"]).await;
    let proxy = start_proxy(|c| c.upstream.default_port = origin.port()).await;

    let mut client = proxy.connect().await;
    client
        .write_all(b"GET /127.0.0.1/status HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();

    let request = tokio::time::timeout(IO_TIMEOUT, received).await.unwrap().unwrap();
    assert_eq!(request, b"GET /status HTTP/1.1\r\nHost: x\r\n\r\n");

    let response = read_until_closed(&mut client).await;
    assert_eq!(
        response,
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nAccess-Control-Allow-Origin: *\r\n\r\nok"
    );

    proxy.shutdown.trigger();
    proxy.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn post_body_and_explicit_port_are_relayed() {
    let (origin, received) =
        start_origin(&["HTTP/1.1 204 No Content\r\n\r\n"]).await;
    let proxy = start_proxy(|_| {}).await;

    let mut client = proxy.connect().await;
    let request = format!(
        "POST /127.0.0.1:{}/options.json HTTP/1.1\r\nContent-Length: 10\r\n\r\n{{\"a\":true}}",
        origin.port()
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let seen = tokio::time::timeout(IO_TIMEOUT, received).await.unwrap().unwrap();
    assert_eq!(
        seen,
        b"POST /options.json HTTP/1.1\r\nContent-Length: 10\r\n\r\n{\"a\":true}"
    );

    let response = read_until_closed(&mut client).await;
    assert_eq!(
        response,
        b"HTTP/1.1 204 No Content\r\nAccess-Control-Allow-Origin: *\r\n\r\n"
    );
}

#[tokio::test]
async fn fragmented_origin_headers_still_get_cors() {
    let (origin, _received) = start_origin(&[
        "HTTP/1.1 200 OK\r\nContent-Le",
        "ngth: 5\r\n\r",
        "\nhel",
        "lo",
    ])
    .await;
    let proxy = start_proxy(|c| c.upstream.default_port = origin.port()).await;

    let mut client = proxy.connect().await;
    client
        .write_all(b"GET /127.0.0.1/ HTTP/1.1\r\n\r\n")
        .await
        .unwrap();

    let response = read_until_closed(&mut client).await;
    assert_eq!(
        response,
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nAccess-Control-Allow-Origin: *\r\n\r\nhello"
    );
    assert_eq!(body_of(&response), b"hello");
}

#[tokio::test]
async fn discovery_snapshot_is_json_and_closes() {
    let proxy = start_proxy(|_| {}).await;

    let mut client = proxy.connect().await;
    client.write_all(b"GET /mdns HTTP/1.1\r\n\r\n").await.unwrap();
    let response = read_until_closed(&mut client).await;

    assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(find(&response, b"Access-Control-Allow-Origin: *\r\n").is_some());
    assert_eq!(body_of(&response), b"{}");

    proxy
        .updates
        .send(DiscoveryUpdate::Resolved {
            name: "elrs_rx._http._tcp.local.".into(),
            payload: r#"{"address":"10.0.0.1","port":80}"#.into(),
        })
        .unwrap();
    proxy
        .updates
        .send(DiscoveryUpdate::Resolved {
            name: "elrs_tx._http._tcp.local.".into(),
            payload: r#"{"address":"10.0.0.2","port":80}"#.into(),
        })
        .unwrap();
    proxy
        .updates
        .send(DiscoveryUpdate::Removed {
            name: "elrs_tx._http._tcp.local.".into(),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = proxy.connect().await;
    client.write_all(b"GET /mdns HTTP/1.1\r\n\r\n").await.unwrap();
    let response = read_until_closed(&mut client).await;

    let body: serde_json::Value = serde_json::from_slice(body_of(&response)).unwrap();
    let object = body.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert_eq!(object["elrs_rx._http._tcp.local."]["address"], "10.0.0.1");
}

#[tokio::test]
async fn preflight_keeps_connection_open() {
    let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = origin.local_addr().unwrap().port();
    let proxy = start_proxy(|_| {}).await;

    proxy
        .updates
        .send(DiscoveryUpdate::Resolved {
            name: "elrs_rx._http._tcp.local.".into(),
            payload: r#"{"address":"10.0.0.1","port":80}"#.into(),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut before = proxy.connect().await;
    before.write_all(b"GET /mdns HTTP/1.1\r\n\r\n").await.unwrap();
    let seeded = read_until_closed(&mut before).await;

    let mut client = proxy.connect().await;
    let preflight = format!("OPTIONS /127.0.0.1:{port}/x HTTP/1.1\r\n\r\n");
    client.write_all(preflight.as_bytes()).await.unwrap();

    let mut reply = vec![0u8; PREFLIGHT_RESPONSE.len()];
    tokio::time::timeout(IO_TIMEOUT, client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, PREFLIGHT_RESPONSE);

    // The target named in the preflight is never contacted.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), origin.accept())
            .await
            .is_err()
    );

    // Same connection, next request is classified afresh and sees the same cache.
    client.write_all(b"GET /mdns HTTP/1.1\r\n\r\n").await.unwrap();
    let response = read_until_closed(&mut client).await;
    assert_eq!(body_of(&response), body_of(&seeded));

    let body: serde_json::Value = serde_json::from_slice(body_of(&response)).unwrap();
    assert_eq!(body.as_object().unwrap().len(), 1);
    assert_eq!(body["elrs_rx._http._tcp.local."]["address"], "10.0.0.1");
}

#[tokio::test]
async fn oversized_origin_header_closes_both_sides() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = listener.local_addr().unwrap();
    let proxy = start_proxy(|c| {
        c.protocol.read_buffer_bytes = 64;
        c.protocol.max_header_bytes = 128;
    })
    .await;

    let mut client = proxy.connect().await;
    let request = format!("GET /127.0.0.1:{}/x HTTP/1.1\r\n\r\n", origin.port());
    client.write_all(request.as_bytes()).await.unwrap();

    let (mut upstream, _) = tokio::time::timeout(IO_TIMEOUT, listener.accept())
        .await
        .unwrap()
        .unwrap();
    read_http_message(&mut upstream).await;

    // Header lines well past the limit and no blank line.
    let mut head = b"HTTP/1.1 200 OK\r\n".to_vec();
    for i in 0..16 {
        head.extend_from_slice(format!("X-Filler-{i}: aaaaaaaaaaaaaaaa\r\n").as_bytes());
    }
    upstream.write_all(&head).await.unwrap();

    assert!(read_until_closed(&mut client).await.is_empty());

    // Bytes the proxy never read may turn its close into a reset.
    let mut rest = Vec::new();
    let closed = tokio::time::timeout(IO_TIMEOUT, upstream.read_to_end(&mut rest))
        .await
        .expect("origin side was not closed");
    if closed.is_ok() {
        assert!(rest.is_empty());
    }
}

#[tokio::test]
async fn unreachable_destination_closes_client() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);

    let proxy = start_proxy(|_| {}).await;
    let mut client = proxy.connect().await;
    let request = format!("GET /127.0.0.1:{port}/x HTTP/1.1\r\n\r\n");
    client.write_all(request.as_bytes()).await.unwrap();

    assert!(read_until_closed(&mut client).await.is_empty());
}

#[tokio::test]
async fn unsupported_method_is_dropped() {
    let proxy = start_proxy(|_| {}).await;
    let mut client = proxy.connect().await;
    client.write_all(b"DELETE /x/y HTTP/1.1\r\n\r\n").await.unwrap();
    assert!(read_until_closed(&mut client).await.is_empty());
}

#[tokio::test]
async fn client_close_closes_origin_side() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = listener.local_addr().unwrap();
    let proxy = start_proxy(|_| {}).await;

    let mut client = proxy.connect().await;
    let request = format!("GET /127.0.0.1:{}/x HTTP/1.1\r\n\r\n", origin.port());
    client.write_all(request.as_bytes()).await.unwrap();

    let (mut upstream, _) = tokio::time::timeout(IO_TIMEOUT, listener.accept())
        .await
        .unwrap()
        .unwrap();
    let seen = read_http_message(&mut upstream).await;
    assert_eq!(seen, b"GET /x HTTP/1.1\r\n\r\n");

    drop(client);

    let mut rest = Vec::new();
    let _ = tokio::time::timeout(IO_TIMEOUT, upstream.read_to_end(&mut rest))
        .await
        .expect("origin side was not closed");
    assert!(rest.is_empty());
}

#[tokio::test]
async fn connections_over_the_limit_are_rejected() {
    let proxy = start_proxy(|c| c.listener.max_connections = 1).await;

    let mut first = proxy.connect().await;
    first
        .write_all(b"OPTIONS / HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let mut reply = vec![0u8; PREFLIGHT_RESPONSE.len()];
    first.read_exact(&mut reply).await.unwrap();

    let mut second = proxy.connect().await;
    assert!(read_until_closed(&mut second).await.is_empty());

    // The first connection is unaffected.
    first.write_all(b"GET /mdns HTTP/1.1\r\n\r\n").await.unwrap();
    let response = read_until_closed(&mut first).await;
    assert_eq!(body_of(&response), b"{}");
}

#[tokio::test]
async fn discovery_is_primed_and_refreshed() {
    let proxy = start_proxy(|c| c.discovery.refresh_interval_secs = 1).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(proxy.queries.load(Ordering::Relaxed), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(proxy.queries.load(Ordering::Relaxed) >= 2);
}

#[tokio::test]
async fn shutdown_closes_open_connections() {
    let proxy = start_proxy(|_| {}).await;

    let mut client = proxy.connect().await;
    client
        .write_all(b"OPTIONS / HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let mut reply = vec![0u8; PREFLIGHT_RESPONSE.len()];
    client.read_exact(&mut reply).await.unwrap();

    proxy.shutdown.trigger();
    tokio::time::timeout(IO_TIMEOUT, proxy.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(read_until_closed(&mut client).await.is_empty());
}
