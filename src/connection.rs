//! Push-channel connection lifecycle.
//!
//! Guarantees that, whenever the subsystem is enabled, there is either an
//! open channel or a scheduled attempt to open one -- never two
//! simultaneous attempts. Socket errors are absorbed and converted into
//! scheduled retries; nothing here raises across the public boundary for
//! expected runtime conditions.
//!
//! # Architecture
//!
//! ```text
//!   PushClient                     Background connection task
//!       │                                  │
//!       │  connect()  ──spawn──►  run_connection_loop
//!       │  disconnect()                    │  connect → Connected
//!       │  state() / retry_count()         │  heartbeat every 25s
//!       │                                  │  frames → Dispatcher → store
//!       ▼                                  │  on loss: backoff, retry
//!   CancellationToken ─────────────────────┘
//! ```
//!
//! # State machine
//!
//! `Disconnected → Connecting → Connected → (on failure) Reconnecting →
//! Connecting → …`, with `Closed` entered only on explicit teardown. The
//! retry counter resets to 0 on every successful `Connected` transition,
//! and the backoff before attempt k is `min(30s, 1s * 2^(k-1))` -- the
//! sequence 1s, 2s, 4s, 8s, 16s, 30s, 30s, … There is no retry ceiling:
//! a permanently unreachable server produces an indefinite, logged retry
//! loop by design (continuous best-effort availability).

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::constants::{HEARTBEAT_INTERVAL, INITIAL_BACKOFF, MAX_BACKOFF};
use crate::dispatch::Dispatcher;
use crate::store::NotificationStore;
use crate::ws::{self, FrameSink, FrameSource, Transport, WsMessage, WsTransport};

/// Connection state of the push channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not attempting to connect.
    #[default]
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Channel open and receiving frames.
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting {
        /// Upcoming attempt number (1-based).
        attempt: u32,
        /// Milliseconds until that attempt.
        next_retry_ms: u64,
    },
    /// Torn down by `disconnect()`; restart with a fresh `connect()`.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt, .. } => {
                write!(f, "reconnecting (attempt {attempt})")
            }
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Shared connection state observable from outside the connection task.
#[derive(Debug, Default)]
pub struct SharedConnectionState {
    state: RwLock<ConnectionState>,
}

impl SharedConnectionState {
    /// Create new shared state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current state.
    pub async fn get(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Transition to a new state. Single funnel for every transition, so
    /// each one is visible in the logs.
    pub async fn set(&self, new_state: ConnectionState) {
        let mut guard = self.state.write().await;
        if *guard != new_state {
            log::debug!("[push] State: {} -> {}", *guard, new_state);
            *guard = new_state;
        }
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected)
    }
}

/// Client for the server's push channel.
///
/// Owns the single socket (via a background task), the heartbeat timer,
/// and the reconnect schedule; nothing else constructs or closes them.
/// Inbound frames are classified by a [`Dispatcher`] and user-facing ones
/// land in the [`NotificationStore`] handed in at construction.
pub struct PushClient {
    server_url: String,
    token: String,
    auto_reconnect: bool,
    transport: Arc<dyn Transport>,
    store: NotificationStore,
    state: Arc<SharedConnectionState>,
    retry_count: Arc<AtomicU32>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("server_url", &self.server_url)
            .field("auto_reconnect", &self.auto_reconnect)
            .finish_non_exhaustive()
    }
}

impl PushClient {
    /// Creates a client over the production WebSocket transport.
    ///
    /// The token travels as a query parameter on the channel URL (the
    /// transport offers no connection-time headers); an empty token means
    /// an anonymous connection.
    pub fn new(config: &Config, store: NotificationStore) -> Self {
        Self::with_transport(config, store, Arc::new(WsTransport))
    }

    /// Creates a client over an injected transport (used by tests to run
    /// the full state machine against a scripted in-memory channel).
    pub fn with_transport(
        config: &Config,
        store: NotificationStore,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            server_url: config.server_url.clone(),
            token: config.token.clone(),
            auto_reconnect: config.auto_reconnect,
            transport,
            store,
            state: SharedConnectionState::new(),
            retry_count: Arc::new(AtomicU32::new(0)),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    /// Starts the connection loop.
    ///
    /// Idempotent under repeated invocation: while a loop is live, further
    /// calls are ignored, so callers may invoke this freely without ever
    /// producing a second socket. After `disconnect()`, a new call starts
    /// from a clean slate.
    pub fn connect(&self) {
        let mut task = self.task.lock().expect("push client task mutex poisoned");
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                log::debug!("[push] connect() ignored -- connection loop already running");
                return;
            }
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock().expect("push client cancel mutex poisoned") = cancel.clone();
        self.retry_count.store(0, Ordering::SeqCst);

        let ctx = LoopContext {
            url: build_channel_url(&self.server_url, &self.token),
            auto_reconnect: self.auto_reconnect,
            transport: Arc::clone(&self.transport),
            dispatcher: Dispatcher::new(self.store.clone()),
            state: Arc::clone(&self.state),
            retry_count: Arc::clone(&self.retry_count),
            cancel,
        };
        *task = Some(tokio::spawn(run_connection_loop(ctx)));
    }

    /// Tears the connection down: cancels any pending reconnect and the
    /// heartbeat, closes the live socket if present, and resets the retry
    /// counter so a future `connect()` starts clean. Idempotent.
    pub async fn disconnect(&self) {
        self.cancel
            .lock()
            .expect("push client cancel mutex poisoned")
            .cancel();

        let handle = self.task.lock().expect("push client task mutex poisoned").take();
        match handle {
            Some(handle) => {
                let _ = handle.await;
            }
            None => log::debug!("[push] disconnect() with no active connection loop"),
        }

        self.retry_count.store(0, Ordering::SeqCst);
        self.state.set(ConnectionState::Closed).await;
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.state.get().await
    }

    /// Consecutive failed attempts since the last successful connection.
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        if let Ok(cancel) = self.cancel.lock() {
            cancel.cancel();
        }
    }
}

/// Everything the background connection task owns.
struct LoopContext {
    url: String,
    auto_reconnect: bool,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    state: Arc<SharedConnectionState>,
    retry_count: Arc<AtomicU32>,
    cancel: CancellationToken,
}

/// Result of the inner message loop.
enum LoopExit {
    /// Teardown was requested.
    Shutdown,
    /// Connection was lost -- should reconnect.
    Disconnected,
}

/// Builds the channel URL: HTTP(S) schemes become WS(S), and a non-empty
/// token is appended as a query parameter.
fn build_channel_url(server_url: &str, token: &str) -> String {
    let base = ws::http_to_ws_scheme(server_url);
    if token.is_empty() {
        return base;
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}token={token}")
}

/// URL with its query string stripped, safe for logging (the query may
/// carry the bearer token).
fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Backoff delay before the next attempt after `retry_count` consecutive
/// failures: `min(30s, 1s * 2^retry_count)`.
fn backoff_delay(retry_count: u32) -> Duration {
    // 2^5 already exceeds the cap; clamping the exponent keeps the shift
    // in range for arbitrarily large counters.
    let exponent = retry_count.min(5);
    let millis = (INITIAL_BACKOFF.as_millis() as u64) << exponent;
    Duration::from_millis(millis.min(MAX_BACKOFF.as_millis() as u64))
}

/// Main connection loop: connect, run the message loop, back off, retry.
async fn run_connection_loop(ctx: LoopContext) {
    let display_url = redact_url(&ctx.url).to_string();

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        ctx.state.set(ConnectionState::Connecting).await;
        log::info!("[push] Connecting to {}", display_url);

        let connect_result = tokio::select! {
            result = ctx.transport.connect(&ctx.url) => result,
            () = ctx.cancel.cancelled() => break,
        };

        let (writer, reader) = match connect_result {
            Ok(pair) => {
                ctx.retry_count.store(0, Ordering::SeqCst);
                ctx.state.set(ConnectionState::Connected).await;
                log::info!("[push] Channel open");
                pair
            }
            Err(e) => {
                log::warn!("[push] Connection failed: {:#}", e);
                if !schedule_retry(&ctx).await {
                    break;
                }
                continue;
            }
        };

        match run_message_loop(&ctx, writer, reader).await {
            LoopExit::Shutdown => break,
            LoopExit::Disconnected => {
                if !schedule_retry(&ctx).await {
                    break;
                }
            }
        }
    }

    if ctx.cancel.is_cancelled() {
        ctx.state.set(ConnectionState::Closed).await;
    } else {
        ctx.state.set(ConnectionState::Disconnected).await;
    }
    log::info!("[push] Connection loop exited");
}

/// Waits out the backoff delay before the next attempt.
///
/// Returns `false` when the loop should stop instead of retrying
/// (teardown requested, or auto-reconnect disabled).
async fn schedule_retry(ctx: &LoopContext) -> bool {
    if !ctx.auto_reconnect {
        log::info!("[push] Auto-reconnect disabled, staying disconnected");
        return false;
    }

    let retries = ctx.retry_count.fetch_add(1, Ordering::SeqCst);
    let delay = backoff_delay(retries);
    ctx.state
        .set(ConnectionState::Reconnecting {
            attempt: retries + 1,
            next_retry_ms: delay.as_millis() as u64,
        })
        .await;
    log::info!(
        "[push] Reconnecting in {}ms (attempt {})",
        delay.as_millis(),
        retries + 1
    );

    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = ctx.cancel.cancelled() => false,
    }
}

/// Inner message loop for a single open connection.
///
/// Multiplexes inbound frames, the keep-alive heartbeat, and teardown on
/// one task. Returns when the connection is lost or teardown is
/// requested.
async fn run_message_loop(
    ctx: &LoopContext,
    mut writer: Box<dyn FrameSink>,
    mut reader: Box<dyn FrameSource>,
) -> LoopExit {
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
        HEARTBEAT_INTERVAL,
    );
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut acknowledged = false;

    loop {
        tokio::select! {
            msg = reader.recv() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    let outcome = ctx.dispatcher.dispatch(&text);
                    if let Some(authenticated) = outcome.ack {
                        if !acknowledged {
                            acknowledged = true;
                            log::info!(
                                "[push] Connection acknowledged ({})",
                                if authenticated { "authenticated" } else { "anonymous" }
                            );
                        }
                    }
                    if outcome.delivered > 0 {
                        log::debug!("[push] Queued {} notification(s)", outcome.delivered);
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = writer.send_pong(data).await;
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    log::info!("[push] Connection closed by server ({code}: {reason})");
                    return LoopExit::Disconnected;
                }
                Some(Ok(_)) => {
                    // Binary and protocol-level pong frames carry nothing for us
                }
                Some(Err(e)) => {
                    log::warn!("[push] Channel error: {:#}", e);
                    return LoopExit::Disconnected;
                }
                None => {
                    log::info!("[push] Channel stream ended");
                    return LoopExit::Disconnected;
                }
            },
            _ = heartbeat.tick() => {
                let ping = serde_json::json!({
                    "type": "ping",
                    "t": Utc::now().timestamp_millis(),
                });
                if let Err(e) = writer.send_text(&ping.to_string()).await {
                    // Absorbed: a failed keep-alive resolves through the
                    // normal reconnect path, never through the caller.
                    log::debug!("[push] Heartbeat send failed: {:#}", e);
                    return LoopExit::Disconnected;
                }
                log::trace!("[push] Heartbeat sent");
            },
            () = ctx.cancel.cancelled() => {
                let _ = writer.close().await;
                return LoopExit::Shutdown;
            }
        }
    }
}
