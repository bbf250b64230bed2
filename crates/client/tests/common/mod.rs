//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use pastewatch_client::ScanApi;
use pastewatch_shared::{
    ApiError, ResultsMetadata, ResultsSummary, ScanRequest, ScanResponse, ScanResult,
    ScanResultsData, ScanState, ScanStatus,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

// --- Fixtures ---

pub fn status(scan_id: &str, state: ScanState, progress: f64) -> ScanStatus {
    ScanStatus {
        scan_id: scan_id.to_string(),
        status: state,
        progress,
        total_results: 0,
        timestamp: "2024-05-01T10:00:00.000000".to_string(),
        error: None,
    }
}

pub fn results(count: usize) -> ScanResultsData {
    let results: Vec<ScanResult> = (0..count)
        .map(|i| ScanResult {
            url: format!("https://pastebin.com/{i}"),
            source: "pastebin".to_string(),
            title: format!("paste {i}"),
            author: "anon".to_string(),
            relevance_score: (i as f64 / count.max(1) as f64).min(1.0),
            emails: vec![format!("user{i}@example.com")],
            target_emails: vec![format!("user{i}@example.com")],
            has_credentials: i % 2 == 0,
            timestamp: "2024-05-01T10:00:00".to_string(),
            content_preview: None,
        })
        .collect();
    ScanResultsData {
        metadata: ResultsMetadata {
            target_domain: "example.com".to_string(),
            timestamp: "2024-05-01T10:05:00".to_string(),
            total_results: count as u64,
            clearnet_results: count as u64,
            darknet_results: 0,
        },
        summary: ResultsSummary {
            total_results: count as u64,
            high_priority_count: 0,
            total_target_emails: count as u64,
            credentials_found: 0,
        },
        results,
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

// --- In-memory REST double ---

fn not_found() -> ApiError {
    ApiError::Server {
        status: 404,
        message: "Scan not found".to_string(),
    }
}

/// `ScanApi` backed by maps, recording every call.
#[derive(Default)]
pub struct MockApi {
    pub statuses: Mutex<HashMap<String, Result<ScanStatus, ApiError>>>,
    pub results: Mutex<HashMap<String, Result<ScanResultsData, ApiError>>>,
    pub start: Mutex<Option<Result<ScanResponse, ApiError>>>,
    /// Extra latency for status fetches of one id.
    pub status_delay: Mutex<HashMap<String, Duration>>,
    pub status_calls: Mutex<Vec<String>>,
    pub results_calls: Mutex<Vec<String>>,
    pub start_calls: Mutex<Vec<ScanRequest>>,
    pub list_calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, status: ScanStatus) {
        self.statuses.lock().insert(status.scan_id.clone(), Ok(status));
    }

    pub fn fail_status(&self, scan_id: &str, error: ApiError) {
        self.statuses.lock().insert(scan_id.to_string(), Err(error));
    }

    pub fn set_results(&self, scan_id: &str, data: ScanResultsData) {
        self.results.lock().insert(scan_id.to_string(), Ok(data));
    }

    pub fn fail_results(&self, scan_id: &str, error: ApiError) {
        self.results.lock().insert(scan_id.to_string(), Err(error));
    }

    pub fn status_calls_for(&self, scan_id: &str) -> usize {
        self.status_calls.lock().iter().filter(|id| *id == scan_id).count()
    }

    pub fn results_calls_for(&self, scan_id: &str) -> usize {
        self.results_calls.lock().iter().filter(|id| *id == scan_id).count()
    }

    pub fn rest_calls(&self) -> usize {
        self.status_calls.lock().len()
            + self.results_calls.lock().len()
            + self.start_calls.lock().len()
            + self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanApi for MockApi {
    async fn start_scan(&self, request: &ScanRequest) -> Result<ScanResponse, ApiError> {
        self.start_calls.lock().push(request.clone());
        self.start.lock().clone().unwrap_or_else(|| {
            Err(ApiError::Server {
                status: 500,
                message: "Failed to start scan".to_string(),
            })
        })
    }

    async fn get_scan_status(&self, scan_id: &str) -> Result<ScanStatus, ApiError> {
        self.status_calls.lock().push(scan_id.to_string());
        let delay = self.status_delay.lock().get(scan_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.statuses
            .lock()
            .get(scan_id)
            .cloned()
            .unwrap_or_else(|| Err(not_found()))
    }

    async fn list_scans(&self) -> Result<Vec<ScanStatus>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .values()
            .filter_map(|s| s.as_ref().ok().cloned())
            .collect())
    }

    async fn get_results(&self, scan_id: &str) -> Result<ScanResultsData, ApiError> {
        self.results_calls.lock().push(scan_id.to_string());
        self.results
            .lock()
            .get(scan_id)
            .cloned()
            .unwrap_or_else(|| Err(not_found()))
    }

    async fn check_health(&self) -> bool {
        true
    }
}

// --- Fake push channel ---

#[derive(Clone)]
struct PushState {
    connections: Arc<AtomicUsize>,
    frames: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
    received: Arc<Mutex<Vec<String>>>,
}

/// An axum server exposing `/ws` that pushes whatever the test sends.
pub struct FakePush {
    pub addr: SocketAddr,
    state: PushState,
}

impl FakePush {
    pub async fn start() -> Self {
        let (frames, _) = broadcast::channel(64);
        let (kick, _) = broadcast::channel(4);
        let state = PushState {
            connections: Arc::new(AtomicUsize::new(0)),
            frames,
            kick,
            received: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Number of sockets accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Send a raw text frame to every connected client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.state.frames.send(frame.into());
    }

    /// Close every open socket from the server side.
    pub fn kick(&self) {
        let _ = self.state.kick.send(());
    }

    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().clone()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<PushState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: PushState) {
    let mut frames = state.frames.subscribe();
    let mut kick = state.kick.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
            _ = kick.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => state.received.lock().push(text.to_string()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// A TCP listener that accepts and immediately drops every connection,
/// so each WebSocket handshake fails. Returns the address and an accept counter.
pub async fn refusing_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (addr, accepted)
}
