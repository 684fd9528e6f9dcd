//! Diagnostic prompt assembly.
//!
//! Each collector step produces its own ordered list of [`Section`]s; the
//! prompt is only rendered to text once, after every step has run. Collector
//! failures drop or replace the affected sections and never abort the build.

mod instructions;

pub use instructions::PromptStep;

use crate::diagnostics::{
    error_log_window, AnalysisRunSummary, Application, ApplicationStatus, DiagnosticSource,
    RolloutSummary,
};
use k8s_openapi::api::core::v1::{ContainerStatus, Event, PodStatus};
use tracing::{debug, warn};

/// One piece of the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    /// Inline instruction for a step of the fixed vocabulary
    Instruction(PromptStep),
    /// Context the preceding instruction refers to
    Detail(String),
}

impl Section {
    fn detail(text: impl Into<String>) -> Self {
        Section::Detail(text.into())
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Section::Instruction(step) => step.instruction(),
            Section::Detail(text) => text,
        }
    }
}

/// Ordered prompt ready to be rendered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    sections: Vec<Section>,
}

impl Prompt {
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The instruction steps, in prompt order
    #[must_use]
    pub fn steps(&self) -> Vec<PromptStep> {
        self.sections
            .iter()
            .filter_map(|section| match section {
                Section::Instruction(step) => Some(*step),
                Section::Detail(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(Section::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Assemble the diagnostic prompt for a `Support` in `namespace`
pub async fn build_prompt(
    app: Option<&Application>,
    source: &dyn DiagnosticSource,
    namespace: &str,
) -> Prompt {
    let mut sections = vec![Section::Instruction(PromptStep::MainInstructions)];

    match app.and_then(|app| app.status.as_ref()) {
        Some(status) => sections.extend(application_sections(status)),
        None => debug!("Application status unavailable, leaving it out of the prompt"),
    }

    sections.extend(rollout_sections(source, namespace).await);
    sections.extend(event_sections(source, namespace).await);
    sections.push(Section::Instruction(PromptStep::EndInstructions));

    Prompt { sections }
}

/// Sections describing the Argo CD application state
#[must_use]
pub fn application_sections(status: &ApplicationStatus) -> Vec<Section> {
    if status.is_quiet() {
        return vec![Section::Instruction(PromptStep::AppHealthy)];
    }

    let mut sections = vec![Section::Instruction(PromptStep::AppConditions)];
    for condition in &status.conditions {
        let transitioned = condition
            .last_transition_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        sections.push(Section::detail(format!(
            "Condition Type: {}, Message: {}, LastTransitionTime: {}",
            condition.type_, condition.message, transitioned
        )));
    }

    for (resource, health) in status.unhealthy_resources() {
        sections.push(Section::Instruction(PromptStep::NonHealthyResource));
        sections.push(Section::detail(format!(
            "Resource: {}/{}, Health: {}, Message: {}",
            resource.kind, resource.name, health.status, health.message
        )));
    }

    sections
}

async fn rollout_sections(source: &dyn DiagnosticSource, namespace: &str) -> Vec<Section> {
    let rollouts = match source.list_rollouts(namespace).await {
        Ok(rollouts) => rollouts,
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "Failed to list rollouts");
            return Vec::new();
        }
    };

    if rollouts.is_empty() {
        return Vec::new();
    }

    let analysis_runs = match source.list_analysis_runs(namespace).await {
        Ok(runs) => runs,
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "Failed to list analysis runs");
            Vec::new()
        }
    };

    let mut sections = Vec::new();
    for rollout in &rollouts {
        sections.push(Section::Instruction(PromptStep::Rollout));
        sections.push(Section::detail(format!("Rollout Name: {}", rollout.name)));
        sections.extend(pod_sections(source, namespace, rollout).await);
        sections.extend(analysis_run_sections(rollout, &analysis_runs));
        sections.push(Section::detail(format!(
            "Rollout {} Status: {}",
            rollout.name, rollout.status
        )));
    }
    sections
}

async fn pod_sections(
    source: &dyn DiagnosticSource,
    namespace: &str,
    rollout: &RolloutSummary,
) -> Vec<Section> {
    let pods = match rollout.current_pod_hash.as_deref() {
        Some(hash) => source
            .list_pods_for_hash(namespace, hash)
            .await
            .unwrap_or_else(|e| {
                warn!(rollout = %rollout.name, error = %e, "Failed to list rollout pods");
                Vec::new()
            }),
        None => Vec::new(),
    };

    let Some(pod) = pods.first() else {
        return vec![Section::Instruction(PromptStep::NoPodLog)];
    };

    let mut sections = Vec::new();
    match source.pod_logs(namespace, pod).await {
        Ok(logs) => match error_log_window(&logs) {
            Some(window) => {
                sections.push(Section::Instruction(PromptStep::LogsWithError));
                sections.push(Section::Detail(window));
            }
            None => debug!(pod = %pod, "No error lines in pod logs"),
        },
        Err(e) => debug!(pod = %pod, error = %e, "No pod logs to process"),
    }

    match source.pod_status(namespace, pod).await {
        Ok(status) => sections.extend(container_status_sections(&status)),
        Err(e) => debug!(pod = %pod, error = %e, "No pod status to process"),
    }

    sections
}

fn container_status_sections(status: &PodStatus) -> Vec<Section> {
    let mut sections = vec![Section::Instruction(PromptStep::PodContainerStatus)];
    sections.extend(
        status
            .container_statuses
            .iter()
            .flatten()
            .map(|container| Section::Detail(container_status_line(container))),
    );

    sections.push(Section::Instruction(PromptStep::PodInitContainerStatus));
    sections.extend(
        status
            .init_container_statuses
            .iter()
            .flatten()
            .map(|container| Section::Detail(container_status_line(container))),
    );
    sections
}

fn container_status_line(container: &ContainerStatus) -> String {
    let state = container
        .state
        .as_ref()
        .and_then(|state| serde_json::to_string(state).ok())
        .unwrap_or_default();
    format!(
        "Container Name: {}, Started: {}, State: {}, Ready: {}, Restart Count: {}",
        container.name,
        container.started.unwrap_or(false),
        state,
        container.ready,
        container.restart_count
    )
}

/// The latest analysis run sharing the rollout's revision. A rollout without
/// a revision matches nothing.
fn analysis_run_sections(rollout: &RolloutSummary, runs: &[AnalysisRunSummary]) -> Vec<Section> {
    let latest = runs
        .iter()
        .filter(|run| rollout.revision.is_some() && run.revision == rollout.revision)
        .max_by_key(|run| run.created_at);

    match latest {
        Some(run) => vec![
            Section::Instruction(PromptStep::AnalysisRuns),
            Section::detail(format!("AnalysisRun {} Status: {}", run.name, run.status)),
        ],
        None => {
            debug!(rollout = %rollout.name, revision = ?rollout.revision, "No analysis run for rollout revision");
            Vec::new()
        }
    }
}

fn is_reportable(event: &Event) -> bool {
    event
        .message
        .as_deref()
        .is_some_and(|message| message == "Warning" || message.contains("Failed"))
}

fn event_line(event: &Event) -> String {
    let object = &event.involved_object;
    let last_seen = event
        .last_timestamp
        .as_ref()
        .map(|t| t.0.to_rfc3339())
        .unwrap_or_default();
    format!(
        "Event Type: {}, Reason: {}, Object: {}/{}, Message: {}, LastTimestamp: {}",
        event.type_.as_deref().unwrap_or_default(),
        event.reason.as_deref().unwrap_or_default(),
        object.kind.as_deref().unwrap_or_default(),
        object.name.as_deref().unwrap_or_default(),
        event.message.as_deref().unwrap_or_default(),
        last_seen
    )
}

async fn event_sections(source: &dyn DiagnosticSource, namespace: &str) -> Vec<Section> {
    let events = match source.list_events(namespace).await {
        Ok(events) => events,
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "No events to fetch");
            return Vec::new();
        }
    };

    let mut sections = Vec::new();
    for event in events.iter().filter(|event| is_reportable(event)) {
        if sections.is_empty() {
            sections.push(Section::Instruction(PromptStep::Events));
        }
        sections.push(Section::Detail(event_line(event)));
    }
    sections
}
