//! `Support` Custom Resource Definition for AI-assisted deployment diagnostics

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Finalizer registered on every live `Support`
pub const SUPPORT_FINALIZER_NAME: &str = "support.argoproj.extensions.io/finalizer";

/// Annotation carrying end-user feedback for a previous result.
/// Its presence switches reconciliation into feedback-update mode.
pub const FEEDBACK_ANNOTATION: &str = "argosupport.argoproj.extensions.io/wf-feedback";

/// Annotation carrying the Argo CD application status captured by the UI
pub const APP_STATUS_ANNOTATION: &str = "argosupport.argoproj.extensions.io/genai";

/// Label identifying the Argo CD application a `Support` was opened for
pub const APP_INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Default retry budget for a workflow
fn default_retry_limit() -> i64 {
    3
}

/// Reference to an `AuthProvider` resource
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct NamespacedObjectReference {
    /// Name of the referenced object
    pub name: String,

    /// Namespace of the referenced object (defaults to the `Support` namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Reference to the `ConfigMap` holding support-contact metadata
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct ConfigMapRef {
    /// Name of the `ConfigMap`
    #[serde(default)]
    pub name: String,
}

/// One named unit of work declared on a `Support`
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Workflow kind; selects the executor (only "gen-ai" is registered)
    pub name: String,

    /// When the workflow was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_at: Option<DateTime<Utc>>,

    /// Auth providers holding credentials for the remote services
    #[serde(default, rename = "autProviderRef")]
    pub auth_provider_ref: Vec<NamespacedObjectReference>,

    /// `ConfigMap` with the `slackSupport` key
    #[serde(default)]
    pub config_map_ref: ConfigMapRef,

    /// Attempts allowed before the workflow is abandoned
    #[serde(default = "default_retry_limit")]
    pub retry_limit: i64,

    /// Delay hint in seconds
    #[serde(default)]
    pub delay: i64,
}

/// `Support` CRD: one diagnostic/support session for a deployment
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "support.argoproj.extensions.io",
    version = "v1alpha1",
    kind = "Support",
    plural = "supports"
)]
#[kube(namespaced)]
#[kube(status = "SupportStatus")]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Count","type":"integer","jsonPath":".status.count"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct SupportSpec {
    /// Workflows to run, in declared order
    #[serde(default)]
    pub workflows: Vec<WorkflowSpec>,
}

/// Coarse-grained reconciliation state
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Running,
    Completed,
    Failed,
    Error,
}

impl Phase {
    /// Phases that always proceed to reconciliation, even without a spec change
    #[must_use]
    pub fn is_recovering(self) -> bool {
        matches!(self, Phase::Running | Phase::Failed)
    }

    /// Phases that settle the current generation
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Running => "running",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Error => "error",
        };
        f.write_str(s)
    }
}

/// End-user vote on a result
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(default)]
    pub up_vote: bool,

    #[serde(default)]
    pub down_vote: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feedback_msg: String,
}

/// Where to reach a human
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Help {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slack_channel: String,
}

/// AI-produced explanation
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default)]
    pub main_summary: String,
}

/// One persisted analysis outcome
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// `<workflow-name>-<unix-epoch>`
    pub name: String,

    #[serde(default)]
    pub summary: Summary,

    #[serde(default)]
    pub help: Help,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Set only through the feedback-update path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

/// Status of the `Support`
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupportStatus {
    /// Most recent first, at most two entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<AnalysisResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// The generation observed by the controller from metadata.generation
    #[serde(default)]
    pub observed_generation: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Attempts made against the workflow retry limit
    #[serde(default)]
    pub count: i64,
}

impl Support {
    /// `metadata.generation`, zero when the server has not assigned one
    #[must_use]
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }

    /// Current phase, if any work was ever claimed
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// Status, created empty on first access
    pub fn status_mut(&mut self) -> &mut SupportStatus {
        self.status.get_or_insert_with(SupportStatus::default)
    }

    /// Raw feedback payload when the resource is in feedback-update mode
    #[must_use]
    pub fn feedback_annotation(&self) -> Option<&str> {
        self.annotations()
            .get(FEEDBACK_ANNOTATION)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.finalizers()
            .iter()
            .any(|f| f == SUPPORT_FINALIZER_NAME)
    }
}
