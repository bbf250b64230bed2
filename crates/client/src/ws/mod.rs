//! Push channel transport.
//!
//! This module provides:
//! - A single shared connection with bounded, linear auto-reconnect
//! - A keepalive ping for the lifetime of each open socket
//! - Fan-out of parsed [`ScanEvent`](pastewatch_shared::ScanEvent)s to
//!   independent subscribers
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────────┐
//!            │        PushClient        │
//!            │ (one socket, reconnects) │
//!            └──────────────────────────┘
//!                         │ parsed events
//!                         ▼
//!              ┌─────────────────────┐
//!              │ SubscriberRegistry  │
//!              └─────────────────────┘
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │    Scan    │ │Notification│ │    ...     │
//!   │Synchronizer│ │   Bridge   │ │            │
//!   └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let push = PushClient::new(&config)?;
//! push.connect();
//! let sub = push.subscribe(|event| {
//!     println!("{} for {}", event.kind(), event.scan_id());
//!     Ok(())
//! });
//! // ...
//! drop(sub);
//! push.disconnect();
//! ```

mod connection;
mod registry;

pub use connection::{ConnectionState, PushClient};
pub use registry::{EventHandler, SubscriberRegistry, Subscription};
