// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote analysis endpoint.
//
// The remote side runs the same analysis on more capable hardware and returns
// an `AnalysisPayload` over a two-route HTTP contract:
//
//   GET  <base>/health   → any 2xx means reachable
//   POST <base>/analyze  → body: original image bytes (application/octet-stream)
//                          header: x-job-id
//                          reply: AnalysisPayload as JSON
//
// Timeouts are enforced by the router, not here.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use schemwerk_core::error::{PipelineError, Result};
use schemwerk_core::{AnalysisPayload, JobId};
use tracing::{debug, instrument, warn};

/// Header carrying the job id on analyze requests.
pub const JOB_ID_HEADER: &str = "x-job-id";

/// A service that can analyse an image on our behalf.
#[async_trait]
pub trait RemoteAnalyzer: Send + Sync {
    /// Human-readable endpoint description for logs.
    fn endpoint(&self) -> &str;

    /// Cheap reachability check.
    async fn health(&self) -> Result<()>;

    /// Analyse the original input bytes.
    async fn analyze(&self, job_id: &JobId, image: &[u8]) -> Result<AnalysisPayload>;
}

/// [`RemoteAnalyzer`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemoteAnalyzer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteAnalyzer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

/// Map a transport error: failures to connect are "unavailable", anything
/// after the request went out is a protocol problem.
fn classify_transport(err: reqwest::Error) -> PipelineError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        PipelineError::RemoteUnavailable(err.to_string())
    } else {
        PipelineError::RemoteProtocol(err.to_string())
    }
}

#[async_trait]
impl RemoteAnalyzer for HttpRemoteAnalyzer {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("health"))
            .send()
            .await
            .map_err(classify_transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PipelineError::RemoteUnavailable(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }

    #[instrument(skip(self, image), fields(endpoint = %self.base_url, bytes = image.len()))]
    async fn analyze(&self, job_id: &JobId, image: &[u8]) -> Result<AnalysisPayload> {
        let response = self
            .client
            .post(self.url("analyze"))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(JOB_ID_HEADER, job_id.as_str())
            .body(image.to_vec())
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Remote analysis rejected");
            return Err(PipelineError::RemoteProtocol(format!(
                "analyze returned {status}"
            )));
        }

        let payload: AnalysisPayload = response
            .json()
            .await
            .map_err(|err| PipelineError::RemoteProtocol(format!("invalid analysis body: {err}")))?;

        debug!(
            text_lines = payload.text_lines.len(),
            components = payload.components.len(),
            "Remote analysis received"
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let remote = HttpRemoteAnalyzer::new("http://analysis.local:8080/");
        assert_eq!(remote.endpoint(), "http://analysis.local:8080");
        assert_eq!(remote.url("analyze"), "http://analysis.local:8080/analyze");
    }

    #[tokio::test]
    async fn unreachable_host_is_unavailable() {
        // Port 9 (discard) on localhost is closed on any sane test machine.
        let remote = HttpRemoteAnalyzer::new("http://127.0.0.1:9");
        let err = remote.health().await.unwrap_err();
        assert!(matches!(err, PipelineError::RemoteUnavailable(_)), "got {err:?}");
    }
}
