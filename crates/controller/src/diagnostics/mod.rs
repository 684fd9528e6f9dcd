//! Read-only collectors feeding the prompt pipeline.
//!
//! Every collector is namespace scoped and may fail independently; callers
//! are expected to degrade rather than abort when one of them does.

pub mod application;
pub mod cluster;
#[cfg(test)]
pub(crate) mod fake;

pub use application::{
    parse_application_annotation, Application, ApplicationCondition, ApplicationStatus,
    HealthStatus, ResourceStatus, HEALTH_STATUS_HEALTHY,
};
pub use cluster::KubeDiagnostics;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, PodStatus};
use serde_json::Value;
use thiserror::Error;

/// Annotation Argo Rollouts stamps on rollouts and analysis runs
pub const ROLLOUT_REVISION_ANNOTATION: &str = "rollout.argoproj.io/revision";

/// Label Argo Rollouts puts on the pods of a revision
pub const ROLLOUT_POD_HASH_LABEL: &str = "rollouts-pod-template-hash";

/// Lines kept on each side of the first error line
const LOG_CONTEXT_LINES: usize = 5;

#[derive(Debug, Error)]
pub enum DiagnosticError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// What the prompt needs to know about one rollout
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutSummary {
    pub name: String,
    /// `status.currentPodHash`, used to find the revision's pods
    pub current_pod_hash: Option<String>,
    /// Value of the rollout revision annotation
    pub revision: Option<String>,
    pub status: Value,
}

/// What the prompt needs to know about one analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRunSummary {
    pub name: String,
    pub revision: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: Value,
}

#[async_trait]
pub trait DiagnosticSource: Send + Sync {
    async fn list_rollouts(&self, namespace: &str) -> Result<Vec<RolloutSummary>, DiagnosticError>;

    /// Names of the pods labelled with the given rollout pod-template hash
    async fn list_pods_for_hash(
        &self,
        namespace: &str,
        hash: &str,
    ) -> Result<Vec<String>, DiagnosticError>;

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String, DiagnosticError>;

    async fn pod_status(&self, namespace: &str, pod: &str) -> Result<PodStatus, DiagnosticError>;

    async fn list_analysis_runs(
        &self,
        namespace: &str,
    ) -> Result<Vec<AnalysisRunSummary>, DiagnosticError>;

    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>, DiagnosticError>;
}

/// The lines surrounding the first line that mentions `error`, or `None`
/// when no line does.
#[must_use]
pub fn error_log_window(logs: &str) -> Option<String> {
    let lines: Vec<&str> = logs.split('\n').collect();
    let index = lines.iter().position(|line| line.contains("error"))?;

    let start = index.saturating_sub(LOG_CONTEXT_LINES);
    let end = (index + LOG_CONTEXT_LINES + 1).min(lines.len());
    Some(lines[start..end].join("\n"))
}
