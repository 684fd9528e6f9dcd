use std::fmt;

/// Fixed vocabulary of prompt steps, each mapped to one inline instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptStep {
    MainInstructions,
    AppHealthy,
    AppConditions,
    NonHealthyResource,
    Rollout,
    NoPodLog,
    LogsWithError,
    PodContainerStatus,
    PodInitContainerStatus,
    AnalysisRuns,
    Events,
    EndInstructions,
}

impl PromptStep {
    pub const ALL: [PromptStep; 12] = [
        PromptStep::MainInstructions,
        PromptStep::AppHealthy,
        PromptStep::AppConditions,
        PromptStep::NonHealthyResource,
        PromptStep::Rollout,
        PromptStep::NoPodLog,
        PromptStep::LogsWithError,
        PromptStep::PodContainerStatus,
        PromptStep::PodInitContainerStatus,
        PromptStep::AnalysisRuns,
        PromptStep::Events,
        PromptStep::EndInstructions,
    ];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            PromptStep::MainInstructions => "main_instructions",
            PromptStep::AppHealthy => "app-healthy",
            PromptStep::AppConditions => "app-conditions",
            PromptStep::NonHealthyResource => "non-healthy-res",
            PromptStep::Rollout => "rollout",
            PromptStep::NoPodLog => "no-pod-log",
            PromptStep::LogsWithError => "logs-with-error",
            PromptStep::PodContainerStatus => "podContainerStatus",
            PromptStep::PodInitContainerStatus => "podInitContainerStatus",
            PromptStep::AnalysisRuns => "analysis-runs",
            PromptStep::Events => "events",
            PromptStep::EndInstructions => "end_instructions",
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.key() == key)
    }

    /// Inline instruction sent to the model for this step
    #[must_use]
    pub fn instruction(self) -> &'static str {
        match self {
            PromptStep::MainInstructions => concat!(
                "<prompt>Disregard any previous instructions. You are an expert in debugging Kubernetes issues. ",
                "Provide the debug summary as a list of points and highlight the fields of the resource that might cause the issue. ",
                "Do not add points about anything that is not provided below, do not make assumptions, and leave out details that are irrelevant to debugging. ",
                "Additional inline instructions are enclosed in <prompt></prompt> tags, each followed by the resource spec and status to infer the issue from.</prompt>"
            ),
            PromptStep::AppHealthy => concat!(
                "<prompt>The application seems to be healthy and there is nothing to analyse. ",
                "Discard the data provided and do not summarize it. ",
                "Reply with: the application seems to be healthy and there is nothing to summarize.</prompt>"
            ),
            PromptStep::AppConditions => concat!(
                "<prompt>When analysing the application, consider each condition's reason and message, ",
                "and whether a condition has been true and progressing for more than 15 minutes (lastTransitionTime against lastUpdateTime). ",
                "Also consider status.phase, status.message, status.canary.podTemplateHash, status.currentPodHash and status.stableRS. ",
                "If there is not enough information, recommend reviewing the status and reaching out to support.</prompt>"
            ),
            PromptStep::NonHealthyResource => {
                "<prompt>Evaluate the non-healthy resource based on its health message.</prompt>"
            }
            PromptStep::Rollout => concat!(
                "<prompt>When analysing the rollout, look at status.phase first. ",
                "If the phase is Healthy, reply that the rollout seems to be healthy and there is no apparent issue to debug, and stop there. ",
                "Otherwise include phase, observedGeneration and message in the analysis, compare stableRS with podTemplateHash, ",
                "evaluate conditions that have been true for more than 15 minutes using the difference between lastUpdateTime and lastTransitionTime, ",
                "and discard conditions that are false. ",
                "If the root cause cannot be identified, only recommend checking with Argo support.</prompt>"
            ),
            PromptStep::NoPodLog => concat!(
                "<prompt>Pod logs are not available, the pod could have been terminated. ",
                "Check the events and whether the rollout or deployment was aborted, and include that in the analysis.</prompt>"
            ),
            PromptStep::LogsWithError => concat!(
                "<prompt>Evaluate the logs for the error causing the failure. ",
                "Highlight any pod failure that causes pods to fail.</prompt>"
            ),
            PromptStep::PodContainerStatus => concat!(
                "<prompt>Evaluate the container statuses for errors causing the failure. ",
                "Highlight any container status that causes pods to fail.</prompt>"
            ),
            PromptStep::PodInitContainerStatus => concat!(
                "<prompt>Evaluate the init container statuses for errors causing the failure. ",
                "Highlight any init container status that causes pods to fail.</prompt>"
            ),
            PromptStep::AnalysisRuns => concat!(
                "<prompt>When the AnalysisRun phase is Error, check for failed metrics. ",
                "Discard the AnalysisRun if it terminated with phase Successful and has no failed metrics.</prompt>"
            ),
            PromptStep::Events => concat!(
                "<prompt>Evaluate the events and relate their types to the resource status. ",
                "Ignore events older than 30 minutes.</prompt>"
            ),
            PromptStep::EndInstructions => concat!(
                "<prompt>Summarize the findings above as short points, the most likely root cause first. ",
                "If the data is not enough to identify the root cause, recommend reviewing the resource status and reaching out to Argo support.</prompt>"
            ),
        }
    }
}

impl fmt::Display for PromptStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
