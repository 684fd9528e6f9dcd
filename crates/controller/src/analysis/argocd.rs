//! Argo CD application lookup

use super::AnalysisError;
use crate::diagnostics::Application;
use async_trait::async_trait;
use reqwest::header::COOKIE;
use std::time::Duration;
use tracing::debug;

const APPLICATIONS_PATH: &str = "api/v1/applications";

/// Source of Argo CD application state, keyed by application name
#[async_trait]
pub trait ApplicationSource: Send + Sync {
    async fn application(&self, name: &str) -> Result<Application, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct ArgoCdClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ArgoCdClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn application_url(&self, name: &str) -> String {
        format!("{}/{APPLICATIONS_PATH}/{name}", self.base_url)
    }
}

#[async_trait]
impl ApplicationSource for ArgoCdClient {
    async fn application(&self, name: &str) -> Result<Application, AnalysisError> {
        let url = self.application_url(name);
        debug!(url = %url, "Fetching Argo CD application");

        let response = self
            .client
            .get(&url)
            .header(COOKIE, format!("argocd.token={}", self.token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AnalysisError::MalformedResponse(e.to_string()))
    }
}
