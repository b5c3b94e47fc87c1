//! Shared WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves behind the [`Transport`] seam. All socket
//! consumers in the crate go through this module rather than through
//! `tokio-tungstenite` directly.
//!
//! # Architecture
//!
//! [`WsTransport::connect`] handles URL parsing and TLS negotiation and
//! returns boxed ([`FrameSink`], [`FrameSource`]) halves ready for use in
//! `tokio::select!` loops. The push protocol authenticates via a query
//! parameter on the channel URL, so no header plumbing is exposed here.
//!
//! The connection loop depends only on the traits, which lets tests drive
//! the full state machine with a scripted in-memory transport and a fake
//! clock.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket message.
#[derive(Debug)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Pong frame with payload.
    Pong(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of a push-channel connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a UTF-8 text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails (connection closed, I/O error).
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Send a pong frame in response to a protocol-level ping.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()>;

    /// Flush pending writes and close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if closing fails.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a push-channel connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next message, returning `None` when the stream ends.
    async fn recv(&mut self) -> Option<Result<WsMessage>>;
}

/// Factory for push-channel connections.
///
/// The production implementation is [`WsTransport`]; tests inject a
/// scripted fake so the connection state machine runs without sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url` and return split writer/reader halves.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the handshake fails.
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;
}

/// Write half of a live WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl FrameSink for WsWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send_text failed")
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .context("WebSocket send_pong failed")
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("WebSocket close failed")
    }
}

/// Read half of a live WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsReader {
    /// Raw `Frame` variants are skipped internally.
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(WsMessage::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Some(Ok(WsMessage::Binary(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(WsMessage::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Pong(data))) => {
                    return Some(Ok(WsMessage::Pong(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Some(Ok(tungstenite::Message::Frame(_))) => {
                    // Raw frames — skip
                    continue;
                }
                Some(Err(e)) => {
                    return Some(Err(anyhow::anyhow!("WebSocket read error: {e}")));
                }
                None => return None,
            }
        }
    }
}

/// Production transport backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .context("WebSocket connect failed")?;

        let (sink, stream) = ws_stream.split();

        Ok((
            Box::new(WsWriter { sink }),
            Box::new(WsReader { stream }),
        ))
    }
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replace("https://", "wss://")
            .replace("http://", "ws://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme_https() {
        assert_eq!(
            http_to_ws_scheme("https://example.com"),
            "wss://example.com"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_http() {
        assert_eq!(
            http_to_ws_scheme("http://localhost:3000"),
            "ws://localhost:3000"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_passthrough() {
        assert_eq!(
            http_to_ws_scheme("wss://example.com/stream"),
            "wss://example.com/stream"
        );
        assert_eq!(
            http_to_ws_scheme("ws://localhost:3000/stream"),
            "ws://localhost:3000/stream"
        );
    }

    #[tokio::test]
    async fn test_connect_invalid_url_returns_error() {
        let result = WsTransport.connect("not-a-url").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_returns_error() {
        let result = WsTransport.connect("ws://127.0.0.1:1/stream").await;
        assert!(result.is_err());
    }
}
