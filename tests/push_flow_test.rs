//! End-to-end push flow tests.
//!
//! Drives the real tokio-tungstenite transport against an in-process
//! WebSocket server: frame delivery into the store, token handshake, and
//! recovery after a dropped connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

use pulsewire::{Config, ConnectionState, NotificationKind, NotificationStore, PushClient};

/// Polls `cond` until it holds or the timeout elapses.
async fn wait_for(cond: impl Fn() -> bool, timeout: Duration) {
    tokio::time::timeout(timeout, async {
        loop {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn config_for(addr: std::net::SocketAddr, token: &str) -> Config {
    Config {
        server_url: format!("ws://{addr}"),
        token: token.to_string(),
        auto_reconnect: true,
    }
}

#[tokio::test]
async fn test_end_to_end_delivery() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        ws.send(Message::Text(
            r#"{"type":"connection_ack","authenticated":false}"#.into(),
        ))
        .await
        .expect("send ack");
        ws.send(Message::Text(
            r#"{"id":"n1","title":"Alert","message":"single","kind":"warning","duration":0}"#
                .into(),
        ))
        .await
        .expect("send single");
        ws.send(Message::Text(
            r#"[{"message":"a","duration":0},{"message":"b","duration":0,"meta":{"link":"https://example.com/x"}}]"#
                .into(),
        ))
        .await
        .expect("send batch");
        // Control, malformed, and incomplete frames must all be absorbed
        ws.send(Message::Text(r#"{"type":"pong"}"#.into()))
            .await
            .expect("send pong");
        ws.send(Message::Text("garbage{{".into()))
            .await
            .expect("send garbage");
        ws.send(Message::Text(r#"{"title":"no body"}"#.into()))
            .await
            .expect("send bodyless");

        // Hold the connection open until the client goes away
        while let Some(Ok(_)) = ws.next().await {}
    });

    let store = NotificationStore::new();
    let client = PushClient::new(&config_for(addr, ""), store.clone());
    client.connect();

    wait_for(|| store.len() == 3, Duration::from_secs(5)).await;

    let items = store.items();
    assert_eq!(items[0].id, "n1");
    assert_eq!(items[0].title.as_deref(), Some("Alert"));
    assert_eq!(items[0].kind, NotificationKind::Warning);
    assert_eq!(items[1].message, "a");
    assert_eq!(items[2].message, "b");
    assert_eq!(items[2].link(), Some("https://example.com/x"));
    assert!(matches!(client.state().await, ConnectionState::Connected));

    // Manual dismissal is idempotent
    store.remove("n1");
    assert_eq!(store.len(), 2);
    store.remove("n1");
    assert_eq!(store.len(), 2);

    client.disconnect().await;
    assert_eq!(client.state().await, ConnectionState::Closed);
    assert_eq!(client.retry_count(), 0);

    server.abort();
}

#[tokio::test]
async fn test_token_travels_as_query_parameter() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let captured_uri = Arc::new(Mutex::new(None::<String>));
    let server_uri = Arc::clone(&captured_uri);
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            *server_uri.lock().expect("uri mutex poisoned") = Some(req.uri().to_string());
            Ok(resp)
        })
        .await
        .expect("handshake");

        while let Some(Ok(_)) = ws.next().await {}
    });

    let store = NotificationStore::new();
    let client = PushClient::new(&config_for(addr, "sekret-123"), store.clone());
    client.connect();

    wait_for(
        || captured_uri.lock().expect("uri mutex poisoned").is_some(),
        Duration::from_secs(5),
    )
    .await;

    let uri = captured_uri
        .lock()
        .expect("uri mutex poisoned")
        .clone()
        .expect("handshake captured");
    assert!(
        uri.contains("token=sekret-123"),
        "token must ride in the query string, got: {uri}"
    );

    client.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        // First connection: handshake, then drop immediately
        let (stream, _) = listener.accept().await.expect("accept first");
        let ws = tokio_tungstenite::accept_async(stream).await.expect("handshake first");
        drop(ws);

        // Second connection (after the client's 1s backoff): deliver
        let (stream, _) = listener.accept().await.expect("accept second");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake second");
        ws.send(Message::Text(
            r#"{"message":"after reconnect","duration":0}"#.into(),
        ))
        .await
        .expect("send");

        while let Some(Ok(_)) = ws.next().await {}
    });

    let store = NotificationStore::new();
    let client = PushClient::new(&config_for(addr, ""), store.clone());
    client.connect();

    wait_for(|| store.len() == 1, Duration::from_secs(10)).await;
    assert_eq!(store.items()[0].message, "after reconnect");

    client.disconnect().await;
    server.abort();
}
