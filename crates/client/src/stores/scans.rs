//! Scan directory: the list of all scans plus dashboard statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pastewatch_shared::{ScanState, ScanStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api_client::ScanApi;

/// Aggregate counts shown above the scan list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
    /// Queued or running scans.
    pub active: usize,
    pub completed: usize,
    /// Sum of `total_results` over completed scans.
    pub total_results: u64,
}

impl DashboardStats {
    pub fn from_scans(scans: &[ScanStatus]) -> Self {
        scans.iter().fold(Self::default(), |mut stats, scan| {
            if scan.status.is_active() {
                stats.active += 1;
            } else if scan.status == ScanState::Completed {
                stats.completed += 1;
                stats.total_results += scan.total_results;
            }
            stats
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Listing {
    scans: Vec<ScanStatus>,
    /// Sequence number of the refresh that produced `scans`.
    seq: u64,
}

struct DirectoryInner {
    api: Arc<dyn ScanApi>,
    next_seq: AtomicU64,
    listing: watch::Sender<Listing>,
}

/// Cached result of `GET /api/scans`.
#[derive(Clone)]
pub struct ScanDirectory {
    inner: Arc<DirectoryInner>,
}

impl ScanDirectory {
    pub fn new(api: Arc<dyn ScanApi>) -> Self {
        let (listing, _) = watch::channel(Listing::default());
        Self {
            inner: Arc::new(DirectoryInner {
                api,
                next_seq: AtomicU64::new(1),
                listing,
            }),
        }
    }

    pub fn scans(&self) -> Vec<ScanStatus> {
        self.inner.listing.borrow().scans.clone()
    }

    pub fn stats(&self) -> DashboardStats {
        DashboardStats::from_scans(&self.inner.listing.borrow().scans)
    }

    /// Reload the list. Failures are logged and the previous list is kept.
    ///
    /// When refreshes overlap, only a response newer than the one on
    /// display is applied.
    pub async fn refresh(&self) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        match self.inner.api.list_scans().await {
            Ok(scans) => {
                self.inner.listing.send_if_modified(|listing| {
                    if seq < listing.seq {
                        return false;
                    }
                    *listing = Listing { scans, seq };
                    true
                });
            }
            Err(e) => tracing::error!(error = %e, "failed to load scans"),
        }
    }

    /// Fire-and-forget [`ScanDirectory::refresh`], for use as an event trigger.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.refresh().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(id: &str, status: ScanState, total: u64) -> ScanStatus {
        ScanStatus {
            scan_id: id.to_string(),
            status,
            progress: 0.0,
            total_results: total,
            timestamp: "2024-05-01T10:00:00".to_string(),
            error: None,
        }
    }

    #[test]
    fn stats_count_active_and_completed() {
        let scans = vec![
            scan("a", ScanState::Queued, 0),
            scan("b", ScanState::Running, 0),
            scan("c", ScanState::Completed, 7),
            scan("d", ScanState::Completed, 5),
            scan("e", ScanState::Failed, 3),
        ];
        let stats = DashboardStats::from_scans(&scans);
        assert_eq!(
            stats,
            DashboardStats {
                active: 2,
                completed: 2,
                total_results: 12
            }
        );
    }
}
