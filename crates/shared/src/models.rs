//! Shared data models for the pastewatch REST API.

use serde::{Deserialize, Serialize};

/// Relevance score at or above which a result is considered high priority.
pub const HIGH_PRIORITY_THRESHOLD: f64 = 0.7;

/// Relevance score at or above which a result is considered medium priority.
pub const MEDIUM_PRIORITY_THRESHOLD: f64 = 0.5;

// --- Scan lifecycle ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ScanState {
    /// Completed and failed scans never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Queued | ScanState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Queued => "queued",
            ScanState::Running => "running",
            ScanState::Completed => "completed",
            ScanState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Snapshot of one scan as reported by `GET /api/scans/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanStatus {
    pub scan_id: String,
    pub status: ScanState,
    /// Fraction in `[0, 1]`.
    pub progress: f64,
    pub total_results: u64,
    /// Creation instant as sent by the backend (ISO-8601, not always zoned).
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanStatus {
    /// Build a failed snapshot for a scan we only know about from a push event.
    pub fn failed(scan_id: impl Into<String>, error: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            status: ScanState::Failed,
            progress: 0.0,
            total_results: 0,
            timestamp: timestamp.into(),
            error: Some(error.into()),
        }
    }
}

// --- Scan submission ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanOptions {
    pub enable_clearnet: bool,
    pub enable_darknet: bool,
    pub crawl_authors: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            enable_clearnet: true,
            enable_darknet: false,
            crawl_authors: true,
        }
    }
}

/// Body of `POST /api/scan`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRequest {
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub options: ScanOptions,
}

impl ScanRequest {
    pub fn new(urls: Vec<String>, options: ScanOptions) -> Self {
        Self { urls, options }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResponse {
    pub scan_id: String,
    pub status: String,
    pub message: String,
    pub timestamp: String,
}

// --- Results ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_PRIORITY_THRESHOLD {
            Severity::High
        } else if score >= MEDIUM_PRIORITY_THRESHOLD {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    /// Unique within one result set.
    pub url: String,
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub relevance_score: f64,
    #[serde(default)]
    pub emails: Vec<String>,
    /// Subset of `emails` that match the target domain.
    #[serde(default)]
    pub target_emails: Vec<String>,
    #[serde(default)]
    pub has_credentials: bool,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
}

impl ScanResult {
    pub fn severity(&self) -> Severity {
        Severity::from_score(self.relevance_score)
    }

    pub fn is_high_priority(&self) -> bool {
        self.severity() == Severity::High
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsMetadata {
    pub target_domain: String,
    pub timestamp: String,
    pub total_results: u64,
    #[serde(default)]
    pub clearnet_results: u64,
    #[serde(default)]
    pub darknet_results: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsSummary {
    pub total_results: u64,
    #[serde(default)]
    pub high_priority_count: u64,
    #[serde(default)]
    pub total_target_emails: u64,
    #[serde(default)]
    pub credentials_found: u64,
}

/// Payload of `GET /api/results/{id}`. Replaced wholesale on every fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResultsData {
    pub metadata: ResultsMetadata,
    pub summary: ResultsSummary,
    pub results: Vec<ScanResult>,
}

impl ScanResultsData {
    /// Results ordered by descending relevance.
    pub fn sorted_by_relevance(&self) -> Vec<&ScanResult> {
        let mut sorted: Vec<&ScanResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        sorted
    }

    pub fn filter_by_severity(&self, severity: Severity) -> Vec<&ScanResult> {
        self.results
            .iter()
            .filter(|r| r.severity() == severity)
            .collect()
    }

    pub fn high_priority(&self) -> Vec<&ScanResult> {
        self.filter_by_severity(Severity::High)
    }

    pub fn with_credentials(&self) -> Vec<&ScanResult> {
        self.results.iter().filter(|r| r.has_credentials).collect()
    }
}
