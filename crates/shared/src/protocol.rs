//! Push channel protocol.
//!
//! The server sends JSON-encoded [`ScanEvent`]s; the client only ever sends
//! the literal text [`KEEPALIVE_FRAME`].

use serde::{Deserialize, Serialize};

/// Path of the push channel relative to the API base URL.
pub const PUSH_PATH: &str = "/ws";

/// Text frame the client sends periodically to keep the channel alive.
pub const KEEPALIVE_FRAME: &str = "ping";

/// Text the server sends back for each [`KEEPALIVE_FRAME`].
pub const KEEPALIVE_REPLY: &str = "pong";

/// Fallback error text for `scan_failed` events that arrive without one.
pub const UNKNOWN_FAILURE: &str = "Unknown error";

/// Server → client push event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    ScanStarted {
        scan_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    ScanProgress {
        scan_id: String,
        #[serde(default)]
        progress: f64,
    },
    ScanCompleted {
        scan_id: String,
        #[serde(default)]
        total_results: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    ScanFailed {
        scan_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
}

impl ScanEvent {
    pub fn scan_id(&self) -> &str {
        match self {
            ScanEvent::ScanStarted { scan_id, .. }
            | ScanEvent::ScanProgress { scan_id, .. }
            | ScanEvent::ScanCompleted { scan_id, .. }
            | ScanEvent::ScanFailed { scan_id, .. } => scan_id,
        }
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanEvent::ScanStarted { .. } => "scan_started",
            ScanEvent::ScanProgress { .. } => "scan_progress",
            ScanEvent::ScanCompleted { .. } => "scan_completed",
            ScanEvent::ScanFailed { .. } => "scan_failed",
        }
    }

    /// Parse one inbound text frame.
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Error text carried by a `scan_failed` event, never blank.
pub fn failure_text(error: Option<&str>) -> String {
    match error {
        Some(e) if !e.trim().is_empty() => e.to_string(),
        _ => UNKNOWN_FAILURE.to_string(),
    }
}

/// Whether an inbound text frame is the server's keepalive acknowledgement.
pub fn is_keepalive_reply(frame: &str) -> bool {
    frame.trim() == KEEPALIVE_REPLY
}

/// Map an `http(s)` API base URL to its push channel URL.
///
/// The scheme is matched case-insensitively. Returns `None` for any other scheme.
pub fn push_url(base_url: &str) -> Option<String> {
    let (scheme, rest) = base_url.trim_end_matches('/').split_once("://")?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "https" => "wss",
        "http" => "ws",
        _ => return None,
    };
    Some(format!("{ws_scheme}://{rest}{PUSH_PATH}"))
}
