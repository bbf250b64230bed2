//! Push channel connection with state management and auto-reconnect.
//!
//! One [`PushClient`] owns at most one live socket. Create it once at
//! startup and hand clones to every consumer; clones share the socket,
//! the subscriber registry and the reconnect counter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pastewatch_shared::{is_keepalive_reply, ScanEvent, KEEPALIVE_FRAME};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::registry::{SubscriberRegistry, Subscription};
use crate::config::{ClientConfig, ConfigError, ReconnectConfig};

/// Connection state of the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// State shared with the background connection task.
struct Shared {
    url: String,
    reconnect: ReconnectConfig,
    keepalive: Duration,
    registry: Arc<SubscriberRegistry>,
    state: watch::Sender<ConnectionState>,
    /// Bumped by `disconnect()`; tasks from an older generation may not publish state.
    generation: AtomicU64,
}

impl Shared {
    fn publish(&self, generation: u64, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn handle_frame(&self, text: &str) -> Frame {
        if is_keepalive_reply(text) {
            tracing::debug!("keepalive acknowledged");
            return Frame::KeepaliveReply;
        }
        match ScanEvent::parse(text) {
            Ok(event) => {
                tracing::debug!(event = event.kind(), scan_id = event.scan_id(), "push event received");
                self.registry.dispatch(&event);
                Frame::Event
            }
            Err(e) => {
                tracing::error!(error = %e, frame = text, "failed to parse push frame, dropping");
                Frame::Malformed
            }
        }
    }
}

/// What an inbound text frame turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Event,
    KeepaliveReply,
    Malformed,
}

struct Session {
    shutdown: watch::Sender<bool>,
    /// Cleared by the connection task once it gives up reconnecting.
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Session {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

struct Inner {
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            let _ = session.shutdown.send(true);
        }
    }
}

/// Process-wide push channel client.
#[derive(Clone)]
pub struct PushClient {
    inner: Arc<Inner>,
}

impl PushClient {
    /// Create a client for the push channel derived from `config.api_url`.
    ///
    /// Nothing is opened until [`PushClient::connect`] is called.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_url(
            config.ws_url()?,
            config.reconnect.clone(),
            config.keepalive_interval,
        ))
    }

    /// Create a client for an explicit `ws://` / `wss://` URL.
    pub fn with_url(url: impl Into<String>, reconnect: ReconnectConfig, keepalive: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    url: url.into(),
                    reconnect,
                    keepalive,
                    registry: SubscriberRegistry::new(),
                    state,
                    generation: AtomicU64::new(0),
                }),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.shared.url
    }

    /// Open the push channel.
    ///
    /// Idempotent: while a connection is open, being established, or waiting
    /// out a reconnect delay this returns without side effects. Must be
    /// called from within a tokio runtime.
    pub fn connect(&self) {
        let mut session = self.inner.session.lock();
        if let Some(existing) = session.as_ref() {
            if existing.is_live() {
                tracing::debug!(url = %self.inner.shared.url, "push channel already active");
                return;
            }
        }

        // A finished task from an earlier session may still be about to publish.
        let generation = self.inner.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let live = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_connection(
            self.inner.shared.clone(),
            generation,
            live.clone(),
            shutdown_rx,
        ));
        *session = Some(Session { shutdown, live, task });
    }

    /// Stop the keepalive, close the socket and cancel any pending reconnect.
    /// Safe to call when already disconnected.
    pub fn disconnect(&self) {
        let mut session = self.inner.session.lock();
        let Some(active) = session.take() else {
            return;
        };
        self.inner.shared.generation.fetch_add(1, Ordering::SeqCst);
        let _ = active.shutdown.send(true);
        self.inner.shared.state.send_replace(ConnectionState::Disconnected);
        tracing::info!(url = %self.inner.shared.url, "push channel disconnected");
    }

    /// Register a handler for every parsed inbound event.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ScanEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.shared.registry.subscribe(handler)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.shared.registry.len()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state.borrow().clone()
    }

    /// Watch connection state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("url", &self.inner.shared.url)
            .field("state", &self.state())
            .finish()
    }
}

enum SessionEnd {
    Closed,
    Shutdown,
}

async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means the owning client is gone.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Connection management loop. Runs until shutdown or until the reconnect
/// budget is exhausted.
async fn run_connection(
    shared: Arc<Shared>,
    generation: u64,
    live: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt = 0u32;

    loop {
        if attempt == 0 {
            shared.publish(generation, ConnectionState::Connecting);
        }

        let connected = tokio::select! {
            _ = wait_shutdown(&mut shutdown) => return,
            result = connect_async(shared.url.as_str()) => result,
        };

        match connected {
            Ok((stream, _response)) => {
                attempt = 0;
                shared.publish(generation, ConnectionState::Connected);
                tracing::info!(url = %shared.url, "push channel connected");

                match run_session(&shared, stream, &mut shutdown).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Closed => {
                        tracing::info!(url = %shared.url, "push channel closed");
                    }
                }
            }
            Err(e) => {
                tracing::error!(url = %shared.url, error = %e, "push channel connection failed");
            }
        }

        if attempt >= shared.reconnect.max_attempts {
            tracing::error!(
                url = %shared.url,
                max_attempts = shared.reconnect.max_attempts,
                "max push channel reconnection attempts reached"
            );
            // Must be cleared before `Failed` is published.
            live.store(false, Ordering::SeqCst);
            shared.publish(
                generation,
                ConnectionState::Failed {
                    reason: format!(
                        "Max reconnect attempts ({}) exceeded",
                        shared.reconnect.max_attempts
                    ),
                },
            );
            return;
        }

        attempt += 1;
        let delay = shared.reconnect.delay_for_attempt(attempt);
        tracing::info!(
            url = %shared.url,
            attempt,
            max_attempts = shared.reconnect.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnecting push channel"
        );
        shared.publish(generation, ConnectionState::Reconnecting { attempt });

        tokio::select! {
            _ = wait_shutdown(&mut shutdown) => return,
            _ = sleep(delay) => {}
        }
    }
}

/// Pump one open socket: inbound frames to subscribers, keepalive outbound.
async fn run_session(
    shared: &Shared,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    let mut keepalive = interval_at(Instant::now() + shared.keepalive, shared.keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = wait_shutdown(shutdown) => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            _ = keepalive.tick() => {
                // Fire and forget; a dead socket surfaces as a read error.
                if let Err(e) = write.send(Message::Text(KEEPALIVE_FRAME.to_string().into())).await {
                    tracing::debug!(error = %e, "keepalive send failed");
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    shared.handle_frame(text.as_str());
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!(url = %shared.url, "push channel received close frame");
                    return SessionEnd::Closed;
                }
                Some(Ok(Message::Ping(_))) => {
                    // Pong is handled automatically by tungstenite
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(url = %shared.url, error = %e, "push channel read error");
                    return SessionEnd::Closed;
                }
                None => return SessionEnd::Closed,
            }
        }
    }
}
