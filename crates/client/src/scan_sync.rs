//! Per-scan state synchronizer.
//!
//! Merges REST snapshots and push events for one tracked scan id into a
//! single [`ScanView`], published through a `tokio::sync::watch` channel.
//!
//! Every asynchronous operation captures a [`Ticket`] for the view it was
//! started against. Changing the tracked id starts a new view, so responses
//! and events belonging to the previous id are dropped instead of applied.

use std::sync::Arc;

use pastewatch_shared::{
    failure_text, ApiError, ScanEvent, ScanOptions, ScanRequest, ScanResultsData, ScanState,
    ScanStatus,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api_client::ScanApi;
use crate::notifications::{Notification, Notifier};
use crate::ws::{PushClient, Subscription};

/// Read model for one tracked scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanView {
    /// Tracked scan id; `None` while idle.
    pub scan_id: Option<String>,
    pub current_scan: Option<ScanStatus>,
    pub results: Option<ScanResultsData>,
    pub is_loading: bool,
    /// Message of the most recent failed REST call for this scan.
    pub error: Option<String>,
    epoch: u64,
    pending: u32,
}

impl ScanView {
    pub fn is_idle(&self) -> bool {
        self.scan_id.is_none()
    }

    /// The scan failed, or completed and its results are loaded.
    pub fn is_settled(&self) -> bool {
        match self.current_scan.as_ref().map(|s| s.status) {
            Some(ScanState::Failed) => true,
            Some(ScanState::Completed) => self.results.is_some(),
            _ => false,
        }
    }

    /// A REST fetch failed and no push event can bring the view forward:
    /// there is no snapshot to update, or the scan completed without results.
    pub fn is_stalled(&self) -> bool {
        if self.is_loading || self.error.is_none() || self.is_settled() {
            return false;
        }
        match self.current_scan.as_ref().map(|s| s.status) {
            None | Some(ScanState::Completed) => true,
            Some(_) => false,
        }
    }

    fn begin(&mut self) {
        self.pending += 1;
        self.is_loading = true;
    }

    fn end(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        self.is_loading = self.pending > 0;
    }
}

/// Identifies the view an operation was started against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket(u64);

struct SyncInner {
    api: Arc<dyn ScanApi>,
    notifier: Arc<dyn Notifier>,
    view: watch::Sender<ScanView>,
}

impl SyncInner {
    fn current_ticket(&self) -> Ticket {
        Ticket(self.view.borrow().epoch)
    }

    /// Ticket for the current view if it tracks `scan_id`.
    fn ticket_for(&self, scan_id: &str) -> Option<Ticket> {
        let view = self.view.borrow();
        (view.scan_id.as_deref() == Some(scan_id)).then_some(Ticket(view.epoch))
    }

    /// Start a fresh view for `scan_id`.
    fn retarget(&self, scan_id: Option<String>, loading: bool) -> Ticket {
        let mut ticket = Ticket(0);
        self.view.send_modify(|v| {
            let mut next = ScanView {
                scan_id,
                epoch: v.epoch + 1,
                ..ScanView::default()
            };
            if loading {
                next.begin();
            }
            ticket = Ticket(next.epoch);
            *v = next;
        });
        ticket
    }

    /// Apply `f` if the view is still the one `ticket` was issued for.
    fn update(&self, ticket: Ticket, f: impl FnOnce(&mut ScanView)) -> bool {
        self.view.send_if_modified(|v| {
            if v.epoch != ticket.0 {
                tracing::debug!(scan_id = ?v.scan_id, "dropping update for a scan no longer tracked");
                return false;
            }
            f(v);
            true
        })
    }

    fn apply_status(&self, ticket: Ticket, status: ScanStatus) -> bool {
        self.update(ticket, |v| {
            if v.scan_id.as_deref() != Some(status.scan_id.as_str()) {
                return;
            }
            // A terminal snapshot never regresses to an older, active one.
            if let Some(current) = &v.current_scan {
                if current.status.is_terminal() && !status.status.is_terminal() {
                    tracing::debug!(scan_id = %status.scan_id, "ignoring stale active snapshot");
                    return;
                }
            }
            v.current_scan = Some(status);
        })
    }

    fn apply_results(&self, ticket: Ticket, data: ScanResultsData) {
        self.update(ticket, |v| v.results = Some(data));
    }

    fn record_error(&self, ticket: Ticket, error: &ApiError, notify: bool) {
        let message = error.to_string();
        let applied = self.update(ticket, |v| v.error = Some(message.clone()));
        if applied {
            tracing::warn!(error = %message, "scan fetch failed");
            if notify {
                self.notifier.notify(Notification::error(message));
            }
        }
    }

    fn begin(&self, ticket: Ticket) {
        self.update(ticket, ScanView::begin);
    }

    fn end(&self, ticket: Ticket) {
        self.update(ticket, ScanView::end);
    }

    /// Initial load after the tracked id changes.
    async fn load(self: Arc<Self>, ticket: Ticket, scan_id: String) {
        match self.api.get_scan_status(&scan_id).await {
            Ok(status) => {
                let completed = status.status == ScanState::Completed;
                if self.apply_status(ticket, status) && completed {
                    match self.api.get_results(&scan_id).await {
                        Ok(data) => self.apply_results(ticket, data),
                        Err(e) => self.record_error(ticket, &e, true),
                    }
                }
            }
            Err(e) => self.record_error(ticket, &e, true),
        }
        self.end(ticket);
    }

    async fn reload_status(self: Arc<Self>, ticket: Ticket, scan_id: String) {
        match self.api.get_scan_status(&scan_id).await {
            Ok(status) => {
                self.apply_status(ticket, status);
            }
            Err(e) => self.record_error(ticket, &e, true),
        }
    }

    /// Authoritative re-fetch after `scan_completed`; both requests run concurrently.
    async fn reload_completed(self: Arc<Self>, ticket: Ticket, scan_id: String) {
        self.begin(ticket);
        let (status, results) = tokio::join!(
            self.api.get_scan_status(&scan_id),
            self.api.get_results(&scan_id)
        );
        match status {
            Ok(status) => {
                self.apply_status(ticket, status);
            }
            Err(e) => self.record_error(ticket, &e, true),
        }
        match results {
            Ok(data) => self.apply_results(ticket, data),
            Err(e) => self.record_error(ticket, &e, true),
        }
        self.end(ticket);
    }
}

/// Keeps one tracked scan in sync with the REST API and the push channel.
#[derive(Clone)]
pub struct ScanSynchronizer {
    inner: Arc<SyncInner>,
}

impl ScanSynchronizer {
    pub fn new(api: Arc<dyn ScanApi>, notifier: Arc<dyn Notifier>) -> Self {
        let (view, _) = watch::channel(ScanView::default());
        Self {
            inner: Arc::new(SyncInner { api, notifier, view }),
        }
    }

    /// Current read model.
    pub fn view(&self) -> ScanView {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ScanView> {
        self.inner.view.subscribe()
    }

    /// Change the tracked scan. `None` returns to idle.
    ///
    /// A new id loads its status, and its results when already completed.
    /// Tracking the id that is already tracked does nothing. The returned
    /// handle resolves when the initial load has finished.
    pub fn track(&self, scan_id: Option<String>) -> Option<JoinHandle<()>> {
        if self.inner.view.borrow().scan_id == scan_id {
            return None;
        }
        let loading = scan_id.is_some();
        let ticket = self.inner.retarget(scan_id.clone(), loading);
        let scan_id = scan_id?;
        tracing::debug!(scan_id = %scan_id, "tracking scan");
        Some(tokio::spawn(self.inner.clone().load(ticket, scan_id)))
    }

    /// Apply one push event. Events for other scans are ignored.
    ///
    /// Returns the handle of any REST re-fetch the event started.
    pub fn handle_event(&self, event: &ScanEvent) -> Option<JoinHandle<()>> {
        let ticket = self.inner.ticket_for(event.scan_id())?;

        match event {
            ScanEvent::ScanStarted { scan_id, .. } => Some(tokio::spawn(
                self.inner.clone().reload_status(ticket, scan_id.clone()),
            )),
            ScanEvent::ScanProgress { progress, .. } => {
                let progress = progress.clamp(0.0, 1.0);
                self.inner.update(ticket, |v| {
                    if let Some(scan) = v.current_scan.as_mut() {
                        if !scan.status.is_terminal() {
                            scan.progress = progress;
                        }
                    }
                });
                None
            }
            ScanEvent::ScanCompleted { scan_id, .. } => Some(tokio::spawn(
                self.inner.clone().reload_completed(ticket, scan_id.clone()),
            )),
            ScanEvent::ScanFailed {
                scan_id,
                error,
                timestamp,
            } => {
                let error = failure_text(error.as_deref());
                self.inner.update(ticket, |v| match v.current_scan.as_mut() {
                    Some(scan) => {
                        scan.status = ScanState::Failed;
                        scan.error = Some(error);
                    }
                    None => {
                        let timestamp = timestamp
                            .clone()
                            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
                        v.current_scan = Some(ScanStatus::failed(scan_id.clone(), error, timestamp));
                    }
                });
                None
            }
        }
    }

    /// Subscribe to `push`. Dropping the returned subscription detaches.
    pub fn attach(&self, push: &PushClient) -> Subscription {
        let this = self.clone();
        push.subscribe(move |event| {
            this.handle_event(event);
            Ok(())
        })
    }

    /// Submit a new scan, track it and load its initial status.
    pub async fn start_scan(&self, urls: Vec<String>, options: ScanOptions) -> Result<String, ApiError> {
        let before = self.inner.current_ticket();
        self.inner.update(before, |v| {
            v.error = None;
            v.begin();
        });

        let response = match self.inner.api.start_scan(&ScanRequest::new(urls, options)).await {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                self.inner.update(before, |v| {
                    v.error = Some(message);
                    v.end();
                });
                return Err(e);
            }
        };

        let scan_id = response.scan_id;
        tracing::info!(scan_id = %scan_id, "scan submitted");
        let ticket = self.inner.retarget(Some(scan_id.clone()), true);

        let result = match self.inner.api.get_scan_status(&scan_id).await {
            Ok(status) => {
                self.inner.apply_status(ticket, status);
                Ok(scan_id)
            }
            Err(e) => {
                self.inner.record_error(ticket, &e, false);
                Err(e)
            }
        };
        self.inner.end(ticket);
        result
    }

    /// Fetch the status of `scan_id`, applying it if that scan is tracked.
    pub async fn refresh_status(&self, scan_id: &str) -> Result<ScanStatus, ApiError> {
        let ticket = self.inner.ticket_for(scan_id);
        match self.inner.api.get_scan_status(scan_id).await {
            Ok(status) => {
                if let Some(ticket) = ticket {
                    self.inner.apply_status(ticket, status.clone());
                }
                Ok(status)
            }
            Err(e) => {
                if let Some(ticket) = ticket {
                    self.inner.record_error(ticket, &e, false);
                }
                Err(e)
            }
        }
    }

    /// Fetch the results of `scan_id`, replacing them if that scan is tracked.
    pub async fn refresh_results(&self, scan_id: &str) -> Result<ScanResultsData, ApiError> {
        let ticket = self.inner.ticket_for(scan_id);
        if let Some(ticket) = ticket {
            self.inner.begin(ticket);
        }
        let result = self.inner.api.get_results(scan_id).await;
        if let Some(ticket) = ticket {
            match &result {
                Ok(data) => self.inner.apply_results(ticket, data.clone()),
                Err(e) => self.inner.record_error(ticket, e, false),
            }
            self.inner.end(ticket);
        }
        result
    }
}
