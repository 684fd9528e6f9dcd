//! Workflow executors and the registry that selects them by name.

pub mod genai;

use crate::analysis::AnalysisError;
use crate::crds::{Feedback, Support, WorkflowSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Name of the only workflow kind registered by default
pub const GENAI_WORKFLOW: &str = "gen-ai";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Unsupported workflow: {0}")]
    Unsupported(String),

    #[error("AuthProvider {namespace}/{name} not found")]
    AuthProviderNotFound { namespace: String, name: String },

    #[error("Required AuthProvider reference '{0}' is missing")]
    MissingAuthProvider(String),

    #[error("Secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("Secret {name} has no usable key '{key}'")]
    SecretKeyMissing { name: String, key: String },

    #[error("ConfigMap {namespace}/{name} not found")]
    ConfigMapNotFound { namespace: String, name: String },

    #[error("Support has no namespace")]
    MissingNamespace,

    #[error("Invalid feedback payload: {0}")]
    InvalidFeedback(String),

    #[error("Invalid application status annotation: {0}")]
    InvalidApplicationStatus(#[source] serde_json::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Feedback recorded against a previous result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackUpdate {
    /// Name of the `AnalysisResult` the feedback refers to
    pub result_name: String,
    pub feedback: Feedback,
}

/// Handler for one workflow kind
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the workflow, appending its outcome to the in-memory status.
    /// The caller persists the status.
    async fn run(&self, support: &mut Support) -> Result<(), WorkflowError>;

    /// Parse the feedback carried by the resource, without any remote call
    async fn update_feedback(&self, support: &Support) -> Result<FeedbackUpdate, WorkflowError>;
}

/// Builds an executor for one declared workflow
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    async fn build(
        &self,
        workflow: &WorkflowSpec,
        namespace: &str,
    ) -> Result<Box<dyn Executor>, WorkflowError>;
}

/// Workflow name to executor factory
#[derive(Default, Clone)]
pub struct WorkflowRegistry {
    factories: HashMap<String, Arc<dyn ExecutorFactory>>,
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.names())
            .finish()
    }
}

impl WorkflowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn ExecutorFactory>) {
        self.factories.insert(name.into(), factory);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.register(name, factory);
        self
    }

    /// Registered workflow names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the executor for `workflow`
    pub async fn resolve(
        &self,
        workflow: &WorkflowSpec,
        namespace: &str,
    ) -> Result<Box<dyn Executor>, WorkflowError> {
        let factory = self
            .factories
            .get(&workflow.name)
            .ok_or_else(|| WorkflowError::Unsupported(workflow.name.clone()))?;

        debug!(workflow = %workflow.name, namespace = %namespace, "Building workflow executor");
        factory.build(workflow, namespace).await
    }
}
