//! Notification bridge: push events to user-facing notifications.

use std::sync::Arc;

use pastewatch_shared::{failure_text, ScanEvent};
use tokio::sync::mpsc::UnboundedSender;

use crate::ws::{PushClient, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSeverity {
    Info,
    Success,
    Error,
}

/// A toast-style message for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: NotificationSeverity,
    pub title: String,
    pub description: Option<String>,
}

impl Notification {
    pub fn new(severity: NotificationSeverity, title: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NotificationSeverity::Error, title)
    }
}

/// Sink for notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        let description = n.description.as_deref().unwrap_or("");
        match n.severity {
            NotificationSeverity::Info => tracing::info!(title = %n.title, description, "notification"),
            NotificationSeverity::Success => tracing::info!(title = %n.title, description, "notification"),
            NotificationSeverity::Error => tracing::error!(title = %n.title, description, "notification"),
        }
    }
}

impl Notifier for UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

/// Short form of a scan id for display (`abcdefgh...`).
fn short_id(scan_id: &str) -> String {
    let prefix: String = scan_id.chars().take(8).collect();
    format!("{prefix}...")
}

/// Notification for one event. `scan_progress` yields none.
pub fn notification_for(event: &ScanEvent) -> Option<Notification> {
    match event {
        ScanEvent::ScanStarted { scan_id, .. } => Some(
            Notification::new(NotificationSeverity::Info, "Scan started")
                .with_description(format!("Scan ID: {}", short_id(scan_id))),
        ),
        ScanEvent::ScanProgress { .. } => None,
        ScanEvent::ScanCompleted { total_results, .. } => Some(
            Notification::new(NotificationSeverity::Success, "Scan completed!")
                .with_description(format!("Found {total_results} results")),
        ),
        ScanEvent::ScanFailed { error, .. } => Some(
            Notification::error("Scan failed").with_description(failure_text(error.as_deref())),
        ),
    }
}

/// Stateless subscriber that turns events into notifications and asks the
/// scan list to reload on every event.
pub struct NotificationBridge {
    notifier: Arc<dyn Notifier>,
    on_any_event: Arc<dyn Fn() + Send + Sync>,
}

impl NotificationBridge {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            on_any_event: Arc::new(|| {}),
        }
    }

    /// Callback run once per event regardless of type, typically a scan list refresh.
    pub fn with_refresh_trigger(mut self, trigger: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_any_event = Arc::new(trigger);
        self
    }

    pub fn handle_event(&self, event: &ScanEvent) {
        (self.on_any_event)();
        if let Some(notification) = notification_for(event) {
            self.notifier.notify(notification);
        }
    }

    /// Subscribe to `push`. The bridge lives as long as the returned subscription.
    pub fn attach(self, push: &PushClient) -> Subscription {
        push.subscribe(move |event| {
            self.handle_event(event);
            Ok(())
        })
    }
}
