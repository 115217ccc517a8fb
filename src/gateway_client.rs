use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::models::{AnalysisInput, AnalysisResult, ErrorBody};
use crate::session::{AnalyzeApi, ScanFailure};

/// Client for a running analyze endpoint, used by presentation layers.
#[derive(Clone)]
pub struct AnalyzeGatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl AnalyzeGatewayClient {
    /// Creates a new `AnalyzeGatewayClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Where the service listens, e.g. `http://localhost:3002`.
    /// * `timeout` - Overall deadline for one analyze call.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ScanFailure> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ScanFailure::from_error_message(&format!("Failed to create API client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Submits one document for analysis.
    ///
    /// # Returns
    ///
    /// * `Result<AnalysisResult, ScanFailure>` - The result, or the failure
    ///   classified by its `QUOTA_LIMIT` / `AUTH_ERROR` sentinel.
    pub async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult, ScanFailure> {
        let url = format!("{}/api/analyze", self.base_url);
        tracing::info!("Submitting {} input to {}", input.kind(), url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|e| ScanFailure::from_error_message(&format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| format!("API error: {}", status.as_u16()));
            tracing::warn!("Analyze endpoint returned {}: {}", status, message);
            return Err(ScanFailure::from_error_message(&message));
        }

        response.json::<AnalysisResult>().await.map_err(|e| {
            ScanFailure::from_error_message(&format!("Failed to parse analysis result: {}", e))
        })
    }
}

#[async_trait]
impl AnalyzeApi for AnalyzeGatewayClient {
    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult, ScanFailure> {
        AnalyzeGatewayClient::analyze(self, input).await
    }
}
