//! In-memory `DiagnosticSource` for unit tests

use super::{AnalysisRunSummary, DiagnosticError, DiagnosticSource, RolloutSummary};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, PodStatus};
use kube::error::ErrorResponse;
use std::collections::HashMap;

/// `None` collections and missing map entries answer with an API error
#[derive(Debug, Clone, Default)]
pub struct FakeDiagnostics {
    pub rollouts: Option<Vec<RolloutSummary>>,
    pub pods_by_hash: HashMap<String, Vec<String>>,
    pub logs: HashMap<String, String>,
    pub statuses: HashMap<String, PodStatus>,
    pub analysis_runs: Option<Vec<AnalysisRunSummary>>,
    pub events: Option<Vec<Event>>,
}

impl FakeDiagnostics {
    /// A namespace with nothing in it
    pub fn empty() -> Self {
        Self {
            rollouts: Some(Vec::new()),
            analysis_runs: Some(Vec::new()),
            events: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Every collector fails
    pub fn unavailable() -> Self {
        Self::default()
    }
}

pub fn forbidden() -> DiagnosticError {
    DiagnosticError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "forbidden".to_string(),
        reason: "Forbidden".to_string(),
        code: 403,
    }))
}

#[async_trait]
impl DiagnosticSource for FakeDiagnostics {
    async fn list_rollouts(&self, _namespace: &str) -> Result<Vec<RolloutSummary>, DiagnosticError> {
        self.rollouts.clone().ok_or_else(forbidden)
    }

    async fn list_pods_for_hash(
        &self,
        _namespace: &str,
        hash: &str,
    ) -> Result<Vec<String>, DiagnosticError> {
        Ok(self.pods_by_hash.get(hash).cloned().unwrap_or_default())
    }

    async fn pod_logs(&self, _namespace: &str, pod: &str) -> Result<String, DiagnosticError> {
        self.logs.get(pod).cloned().ok_or_else(forbidden)
    }

    async fn pod_status(&self, _namespace: &str, pod: &str) -> Result<PodStatus, DiagnosticError> {
        self.statuses.get(pod).cloned().ok_or_else(forbidden)
    }

    async fn list_analysis_runs(
        &self,
        _namespace: &str,
    ) -> Result<Vec<AnalysisRunSummary>, DiagnosticError> {
        self.analysis_runs.clone().ok_or_else(forbidden)
    }

    async fn list_events(&self, _namespace: &str) -> Result<Vec<Event>, DiagnosticError> {
        self.events.clone().ok_or_else(forbidden)
    }
}
