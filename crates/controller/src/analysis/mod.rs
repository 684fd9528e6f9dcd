//! Remote analysis clients.

pub mod argocd;

pub use argocd::{ApplicationSource, ArgoCdClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Path suffix of the analysis endpoint
const ANALYZE_PATH: &str = "analyze";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Refusing to submit an empty prompt")]
    EmptyPrompt,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Response contained no analyses")]
    NoAnalyses,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    failures: Vec<Failure<'a>>,
}

#[derive(Debug, Serialize)]
struct Failure<'a> {
    context: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    analyses: Vec<Analysis>,
}

#[derive(Debug, Deserialize)]
struct Analysis {
    analysis: String,
}

/// Turns an assembled prompt into a summary
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, prompt: &str) -> Result<String, AnalysisError>;
}

/// Client for the gen-ai analysis endpoint
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: reqwest::Client,
    endpoint: String,
    secret: String,
}

impl AnalysisClient {
    /// Build a client for `{base_url}[/{api_version}]/analyze`
    pub fn new(
        base_url: &str,
        api_version: Option<&str>,
        secret: String,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, api_version, secret))
    }

    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        api_version: Option<&str>,
        secret: String,
    ) -> Self {
        Self {
            client,
            endpoint: analyze_endpoint(base_url, api_version),
            secret,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn analyze_endpoint(base_url: &str, api_version: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    match api_version
        .map(|version| version.trim_matches('/'))
        .filter(|version| !version.is_empty())
    {
        Some(version) => format!("{base}/{version}/{ANALYZE_PATH}"),
        None => format!("{base}/{ANALYZE_PATH}"),
    }
}

#[async_trait]
impl Analyzer for AnalysisClient {
    async fn analyze(&self, prompt: &str) -> Result<String, AnalysisError> {
        if prompt.trim().is_empty() {
            return Err(AnalysisError::EmptyPrompt);
        }

        let request = AnalyzeRequest {
            failures: vec![Failure { context: prompt }],
        };

        debug!(endpoint = %self.endpoint, prompt_len = prompt.len(), "Submitting prompt for analysis");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.secret)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %self.endpoint, status = %status, "Analysis request failed");
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: AnalyzeResponse = serde_json::from_str(&body)
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;

        parsed
            .analyses
            .into_iter()
            .next()
            .map(|analysis| analysis.analysis)
            .ok_or(AnalysisError::NoAnalyses)
    }
}
