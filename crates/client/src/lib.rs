//! Pastewatch Client - real-time scan synchronization layer
//!
//! This crate contains the client side of the pastewatch scan dashboard:
//! the REST client, the shared push channel, the per-scan synchronizer and
//! the notification bridge. Presentation code consumes these and never
//! mutates scan state itself.

pub mod api_client;
pub mod config;
pub mod logging;
pub mod notifications;
pub mod scan_sync;
pub mod stores;
pub mod ws;

pub use api_client::{ApiClient, ScanApi};
pub use config::{ClientConfig, ConfigError, ReconnectConfig};
pub use notifications::{
    notification_for, Notification, NotificationBridge, NotificationSeverity, Notifier,
    TracingNotifier,
};
pub use scan_sync::{ScanSynchronizer, ScanView};
pub use stores::{DashboardStats, ScanDirectory};
pub use ws::{ConnectionState, PushClient, Subscription};
