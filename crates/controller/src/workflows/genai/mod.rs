//! The `gen-ai` workflow: gather diagnostics, ask the analysis service for a
//! summary and record it as a new result.

pub mod factory;
mod feedback;

pub use factory::GenAiExecutorFactory;
pub use feedback::parse_feedback;

use crate::analysis::{Analyzer, ApplicationSource};
use crate::crds::{
    AnalysisResult, Help, Phase, Summary, Support, APP_INSTANCE_LABEL, APP_STATUS_ANNOTATION,
};
use crate::diagnostics::{parse_application_annotation, Application, DiagnosticSource};
use crate::prompt::build_prompt;
use crate::workflows::{Executor, FeedbackUpdate, WorkflowError};
use async_trait::async_trait;
use chrono::Utc;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// `AuthProvider` reference holding the analysis service credentials
pub const GENAI_AUTH_PROVIDER: &str = "genai-auth-provider";

/// Optional `AuthProvider` reference holding an Argo CD token
pub const ARGOCD_AUTH_PROVIDER: &str = "argocd-auth-provider";

/// `ConfigMap` key holding the support channel
pub const SLACK_SUPPORT_KEY: &str = "slackSupport";

const RESULT_MESSAGE: &str = "Gen AI request completed";

pub struct GenAiExecutor {
    workflow_name: String,
    analyzer: Arc<dyn Analyzer>,
    applications: Option<Arc<dyn ApplicationSource>>,
    diagnostics: Arc<dyn DiagnosticSource>,
    slack_channel: String,
}

impl GenAiExecutor {
    #[must_use]
    pub fn new(
        workflow_name: impl Into<String>,
        analyzer: Arc<dyn Analyzer>,
        diagnostics: Arc<dyn DiagnosticSource>,
    ) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            analyzer,
            applications: None,
            diagnostics,
            slack_channel: String::new(),
        }
    }

    #[must_use]
    pub fn with_applications(mut self, applications: Option<Arc<dyn ApplicationSource>>) -> Self {
        self.applications = applications;
        self
    }

    #[must_use]
    pub fn with_slack_channel(mut self, slack_channel: impl Into<String>) -> Self {
        self.slack_channel = slack_channel.into();
        self
    }

    /// Application state from the annotation, falling back to Argo CD when
    /// the annotation carries no status
    async fn resolve_application(
        &self,
        support: &Support,
        raw: &str,
    ) -> Result<Option<Application>, WorkflowError> {
        let parsed =
            parse_application_annotation(raw).map_err(WorkflowError::InvalidApplicationStatus)?;
        if parsed.as_ref().is_some_and(Application::has_status) {
            return Ok(parsed);
        }

        let Some(applications) = &self.applications else {
            return Ok(parsed);
        };
        let Some(instance) = support.labels().get(APP_INSTANCE_LABEL) else {
            debug!("No application instance label, skipping Argo CD lookup");
            return Ok(parsed);
        };

        match applications.application(instance).await {
            Ok(app) => Ok(Some(app)),
            Err(e) => {
                warn!(application = %instance, error = %e, "Unable to fetch application from Argo CD");
                Ok(parsed)
            }
        }
    }
}

#[async_trait]
impl Executor for GenAiExecutor {
    #[instrument(skip(self, support), fields(support = %support.name_any(), workflow = %self.workflow_name))]
    async fn run(&self, support: &mut Support) -> Result<(), WorkflowError> {
        let Some(raw) = support
            .annotations()
            .get(APP_STATUS_ANNOTATION)
            .filter(|value| !value.trim().is_empty())
            .cloned()
        else {
            info!("No application status annotation yet, leaving Support running");
            support.status_mut().phase = Some(Phase::Running);
            return Ok(());
        };

        let namespace = support.namespace().ok_or(WorkflowError::MissingNamespace)?;
        let app = self.resolve_application(support, &raw).await?;

        let prompt = build_prompt(app.as_ref(), self.diagnostics.as_ref(), &namespace)
            .await
            .render();
        info!(prompt_len = prompt.len(), "Submitting diagnostics for analysis");

        let started_at = Utc::now();
        let summary = self.analyzer.analyze(&prompt).await?;
        let finished_at = Utc::now();

        let status = support.status_mut();
        status.results.push(AnalysisResult {
            name: format!("{}-{}", self.workflow_name, finished_at.timestamp()),
            summary: Summary {
                main_summary: summary,
            },
            help: Help {
                slack_channel: self.slack_channel.clone(),
                ..Help::default()
            },
            message: RESULT_MESSAGE.to_string(),
            started_at: Some(started_at),
            finished_at: Some(finished_at),
            phase: Some(Phase::Completed),
            feedback: None,
        });
        status.phase = Some(Phase::Completed);

        info!(results = status.results.len(), "Analysis recorded");
        Ok(())
    }

    async fn update_feedback(&self, support: &Support) -> Result<FeedbackUpdate, WorkflowError> {
        let raw = support.feedback_annotation().ok_or_else(|| {
            WorkflowError::InvalidFeedback("feedback annotation is missing".to_string())
        })?;
        parse_feedback(raw)
    }
}
