//! HTTP client for the scan REST API.

use async_trait::async_trait;
use pastewatch_shared::{ApiError, ScanRequest, ScanResponse, ScanResultsData, ScanStatus};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// The REST operations the synchronizer and scan directory depend on.
///
/// [`ApiClient`] is the production implementation; tests substitute
/// in-memory doubles.
#[async_trait]
pub trait ScanApi: Send + Sync {
    async fn start_scan(&self, request: &ScanRequest) -> Result<ScanResponse, ApiError>;
    async fn get_scan_status(&self, scan_id: &str) -> Result<ScanStatus, ApiError>;
    async fn list_scans(&self) -> Result<Vec<ScanStatus>, ApiError>;
    async fn get_results(&self, scan_id: &str) -> Result<ScanResultsData, ApiError>;
    /// `true` when `GET /health` answers 2xx. Never fails.
    async fn check_health(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Reuse an existing `reqwest` client (connection pool, timeouts).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    async fn get_json<TRes: DeserializeOwned>(&self, path: &str, fallback: &str) -> Result<TRes, ApiError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::from_response(status, &text, fallback));
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
        fallback: &str,
    ) -> Result<TRes, ApiError> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp.text().await.map_err(|e| ApiError::Network(e.to_string()))?;

        if !is_success {
            return Err(ApiError::from_response(status, &text, fallback));
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }
}

#[async_trait]
impl ScanApi for ApiClient {
    async fn start_scan(&self, request: &ScanRequest) -> Result<ScanResponse, ApiError> {
        self.post_json("/api/scan", request, "Failed to start scan").await
    }

    async fn get_scan_status(&self, scan_id: &str) -> Result<ScanStatus, ApiError> {
        let path = format!("/api/scans/{}", urlencoding::encode(scan_id));
        self.get_json(&path, "Failed to get scan status").await
    }

    async fn list_scans(&self) -> Result<Vec<ScanStatus>, ApiError> {
        self.get_json("/api/scans", "Failed to list scans").await
    }

    async fn get_results(&self, scan_id: &str) -> Result<ScanResultsData, ApiError> {
        let path = format!("/api/results/{}", urlencoding::encode(scan_id));
        self.get_json(&path, "Failed to get scan results").await
    }

    async fn check_health(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "health check failed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_without_double_slashes() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(client.url("/api/scans"), "http://localhost:8000/api/scans");
        assert_eq!(client.url("health"), "http://localhost:8000/health");
    }
}
