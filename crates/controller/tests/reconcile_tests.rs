//! Reconciliation scenarios against an in-memory `Support` store.
//!
//! The store enforces resource versions the way the API server does, so the
//! claim and final writes exercise the conflict retry path for real.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1::{Event, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use support_controller::analysis::{AnalysisClient, AnalysisError};
use support_controller::crds::{
    AnalysisResult, Phase, Support, SupportSpec, SupportStatus, WorkflowSpec,
    APP_STATUS_ANNOTATION, FEEDBACK_ANNOTATION, SUPPORT_FINALIZER_NAME,
};
use support_controller::diagnostics::{
    AnalysisRunSummary, DiagnosticError, DiagnosticSource, RolloutSummary,
};
use support_controller::tasks::types::{Context, Error, ReconcileMetrics, Result};
use support_controller::tasks::{
    reconcile_key, reconcile_trigger, ControllerConfig, RetryPolicy, SupportStore,
};
use support_controller::workflows::genai::{parse_feedback, GenAiExecutor};
use support_controller::workflows::{
    Executor, ExecutorFactory, FeedbackUpdate, WorkflowError, WorkflowRegistry, GENAI_WORKFLOW,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NAMESPACE: &str = "payments";
const NAME: &str = "checkout";

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

fn at(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Support>>,
    version: AtomicU64,
    pending_conflicts: AtomicU32,
    status_writes: AtomicU32,
    merge_patches: AtomicU32,
    metadata_writes: AtomicU32,
}

impl MemoryStore {
    fn with(support: Support) -> Self {
        let store = Self::default();
        store.insert(support);
        store
    }

    fn insert(&self, mut support: Support) {
        support.metadata.resource_version = Some(self.next_version());
        let key = (support.namespace().unwrap_or_default(), support.name_any());
        self.objects.lock().unwrap().insert(key, support);
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Fail the next `n` guarded writes with a conflict
    fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    fn current(&self) -> Support {
        self.objects
            .lock()
            .unwrap()
            .get(&(NAMESPACE.to_string(), NAME.to_string()))
            .cloned()
            .unwrap()
    }

    fn status(&self) -> SupportStatus {
        self.current().status.unwrap_or_default()
    }

    fn total_writes(&self) -> u32 {
        self.status_writes.load(Ordering::SeqCst)
            + self.merge_patches.load(Ordering::SeqCst)
            + self.metadata_writes.load(Ordering::SeqCst)
    }

    /// Apply `mutate` to the stored copy when `support` was read at its version
    fn guarded_write(
        &self,
        support: &Support,
        mutate: impl FnOnce(&mut Support),
    ) -> Result<Support> {
        let conflict = || Error::Conflict {
            name: support.name_any(),
        };
        if self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(conflict());
        }

        let key = (support.namespace().unwrap_or_default(), support.name_any());
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get_mut(&key).ok_or(Error::MissingObjectKey)?;
        if stored.resource_version() != support.resource_version() {
            return Err(conflict());
        }

        mutate(stored);
        stored.metadata.resource_version = Some(self.next_version());
        Ok(stored.clone())
    }
}

#[async_trait]
impl SupportStore for MemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Support>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn update_status(&self, support: &Support) -> Result<Support> {
        let written = self.guarded_write(support, |stored| stored.status = support.status.clone())?;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }

    async fn merge_patch_status(&self, _original: &Support, updated: &Support) -> Result<()> {
        let key = (updated.namespace().unwrap_or_default(), updated.name_any());
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get_mut(&key).ok_or(Error::MissingObjectKey)?;
        stored.status = updated.status.clone();
        stored.metadata.resource_version = Some(self.next_version());
        self.merge_patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_finalizers(&self, support: &Support, finalizers: Vec<String>) -> Result<Support> {
        let written = self.guarded_write(support, |stored| {
            stored.metadata.finalizers = Some(finalizers);
        })?;
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }

    async fn clear_annotation(&self, support: &Support, key: &str) -> Result<()> {
        let object_key = (support.namespace().unwrap_or_default(), support.name_any());
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get_mut(&object_key).ok_or(Error::MissingObjectKey)?;
        if let Some(annotations) = stored.metadata.annotations.as_mut() {
            annotations.remove(key);
        }
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted executors
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Outcome {
    /// Append a completed result finished at the given epoch seconds
    Complete(i64),
    Fail,
    StayRunning,
}

/// Names of the executors that ran, in order
type Trail = Arc<Mutex<Vec<&'static str>>>;

struct ScriptedExecutor {
    label: &'static str,
    outcome: Outcome,
    runs: Arc<AtomicU32>,
    trail: Trail,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn run(&self, support: &mut Support) -> std::result::Result<(), WorkflowError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.trail.lock().unwrap().push(self.label);
        match self.outcome {
            Outcome::Complete(secs) => {
                let status = support.status_mut();
                status.results.push(AnalysisResult {
                    name: format!("gen-ai-{secs}"),
                    finished_at: at(secs),
                    phase: Some(Phase::Completed),
                    ..AnalysisResult::default()
                });
                status.phase = Some(Phase::Completed);
                Ok(())
            }
            Outcome::Fail => Err(WorkflowError::Analysis(AnalysisError::Status {
                status: 500,
                body: "boom".to_string(),
            })),
            Outcome::StayRunning => {
                support.status_mut().phase = Some(Phase::Running);
                Ok(())
            }
        }
    }

    async fn update_feedback(
        &self,
        support: &Support,
    ) -> std::result::Result<FeedbackUpdate, WorkflowError> {
        let raw = support
            .feedback_annotation()
            .ok_or_else(|| WorkflowError::InvalidFeedback("missing".to_string()))?;
        parse_feedback(raw)
    }
}

struct ScriptedFactory {
    label: &'static str,
    outcome: Outcome,
    runs: Arc<AtomicU32>,
    trail: Trail,
}

#[async_trait]
impl ExecutorFactory for ScriptedFactory {
    async fn build(
        &self,
        _workflow: &WorkflowSpec,
        _namespace: &str,
    ) -> std::result::Result<Box<dyn Executor>, WorkflowError> {
        Ok(Box::new(ScriptedExecutor {
            label: self.label,
            outcome: self.outcome,
            runs: self.runs.clone(),
            trail: self.trail.clone(),
        }))
    }
}

/// A namespace with no rollouts, analysis runs or events
struct QuietNamespace;

#[async_trait]
impl DiagnosticSource for QuietNamespace {
    async fn list_rollouts(
        &self,
        _namespace: &str,
    ) -> std::result::Result<Vec<RolloutSummary>, DiagnosticError> {
        Ok(Vec::new())
    }

    async fn list_pods_for_hash(
        &self,
        _namespace: &str,
        _hash: &str,
    ) -> std::result::Result<Vec<String>, DiagnosticError> {
        Ok(Vec::new())
    }

    async fn pod_logs(
        &self,
        _namespace: &str,
        _pod: &str,
    ) -> std::result::Result<String, DiagnosticError> {
        Ok(String::new())
    }

    async fn pod_status(
        &self,
        _namespace: &str,
        _pod: &str,
    ) -> std::result::Result<PodStatus, DiagnosticError> {
        Ok(PodStatus::default())
    }

    async fn list_analysis_runs(
        &self,
        _namespace: &str,
    ) -> std::result::Result<Vec<AnalysisRunSummary>, DiagnosticError> {
        Ok(Vec::new())
    }

    async fn list_events(&self, _namespace: &str) -> std::result::Result<Vec<Event>, DiagnosticError> {
        Ok(Vec::new())
    }
}

/// Builds a real gen-ai executor pointed at a mock analysis endpoint
struct MockGenAiFactory {
    base_url: String,
}

#[async_trait]
impl ExecutorFactory for MockGenAiFactory {
    async fn build(
        &self,
        workflow: &WorkflowSpec,
        _namespace: &str,
    ) -> std::result::Result<Box<dyn Executor>, WorkflowError> {
        let analyzer = AnalysisClient::new(
            &self.base_url,
            None,
            "secret".to_string(),
            Duration::from_secs(5),
        )?;
        Ok(Box::new(
            GenAiExecutor::new(workflow.name.clone(), Arc::new(analyzer), Arc::new(QuietNamespace))
                .with_slack_channel("#argo-support"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn workflow(name: &str, retry_limit: i64) -> WorkflowSpec {
    serde_json::from_value(json!({
        "name": name,
        "autProviderRef": [{"name": "genai-auth-provider"}],
        "retryLimit": retry_limit
    }))
    .unwrap()
}

fn support(generation: i64, status: Option<SupportStatus>, workflows: Vec<WorkflowSpec>) -> Support {
    let mut support = Support::new(NAME, SupportSpec { workflows });
    support.metadata.namespace = Some(NAMESPACE.to_string());
    support.metadata.generation = Some(generation);
    support.status = status;
    support
}

fn annotate(support: &mut Support, key: &str, value: &str) {
    support
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
}

fn result(secs: i64) -> AnalysisResult {
    AnalysisResult {
        name: format!("gen-ai-{secs}"),
        finished_at: at(secs),
        phase: Some(Phase::Completed),
        ..AnalysisResult::default()
    }
}

fn context(store: Arc<MemoryStore>, registry: WorkflowRegistry) -> Context {
    init_tracing();
    let config = ControllerConfig {
        retry: RetryPolicy {
            steps: 5,
            initial_backoff_millis: 1,
            factor: 1.0,
            jitter: 0.0,
        },
        ..ControllerConfig::default()
    };
    Context {
        store,
        registry: Arc::new(registry),
        config: Arc::new(config),
        metrics: Arc::new(ReconcileMetrics::default()),
    }
}

fn scripted(outcome: Outcome) -> (WorkflowRegistry, Arc<AtomicU32>) {
    let runs = Arc::new(AtomicU32::new(0));
    let registry = WorkflowRegistry::new().with(
        GENAI_WORKFLOW,
        Arc::new(ScriptedFactory {
            label: GENAI_WORKFLOW,
            outcome,
            runs: runs.clone(),
            trail: Trail::default(),
        }),
    );
    (registry, runs)
}

/// Register one scripted workflow per `(name, outcome)`, all sharing a trail
fn scripted_many(workflows: &[(&'static str, Outcome)]) -> (WorkflowRegistry, Trail) {
    let trail = Trail::default();
    let registry = workflows
        .iter()
        .fold(WorkflowRegistry::new(), |registry, &(name, outcome)| {
            registry.with(
                name,
                Arc::new(ScriptedFactory {
                    label: name,
                    outcome,
                    runs: Arc::new(AtomicU32::new(0)),
                    trail: trail.clone(),
                }),
            )
        });
    (registry, trail)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settled_generation_is_a_no_op() {
    for phase in [Phase::Completed, Phase::Error] {
        let status = SupportStatus {
            phase: Some(phase),
            observed_generation: 2,
            results: vec![result(100)],
            ..SupportStatus::default()
        };
        let store = Arc::new(MemoryStore::with(support(
            2,
            Some(status),
            vec![workflow("gen-ai", 3)],
        )));
        let (registry, runs) = scripted(Outcome::Complete(200));
        let ctx = context(store.clone(), registry);

        let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(store.total_writes(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn missing_support_is_not_an_error() {
    let store = Arc::new(MemoryStore::default());
    let (registry, _) = scripted(Outcome::Complete(100));
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(store.total_writes(), 0);
}

#[tokio::test]
async fn completed_run_keeps_two_newest_results() {
    let status = SupportStatus {
        phase: Some(Phase::Completed),
        observed_generation: 1,
        results: vec![result(100), result(200)],
        ..SupportStatus::default()
    };
    let store = Arc::new(MemoryStore::with(support(
        2,
        Some(status),
        vec![workflow("gen-ai", 3)],
    )));
    let (registry, runs) = scripted(Outcome::Complete(300));
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let status = store.status();
    let names: Vec<_> = status.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["gen-ai-300", "gen-ai-200"]);
    assert_eq!(status.phase, Some(Phase::Completed));
    assert_eq!(status.observed_generation, 2);
    assert_eq!(status.count, 0);
    assert!(status.last_transition_time.is_some());
    assert!(store.current().has_finalizer());
}

#[tokio::test]
async fn failed_run_requeues_after_ten_seconds() {
    let store = Arc::new(MemoryStore::with(support(1, None, vec![workflow("gen-ai", 3)])));
    let (registry, _) = scripted(Outcome::Fail);
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Failed));
    assert_eq!(status.count, 1);
    assert_eq!(status.observed_generation, 0);
    assert!(status.results.is_empty());
    assert_eq!(ctx.metrics.snapshot().requeues, 1);
}

#[tokio::test]
async fn failed_pass_leaves_the_watch_trigger_unchanged() {
    let store = Arc::new(MemoryStore::with(support(1, None, vec![workflow("gen-ai", 3)])));
    let before = store.current();
    let (registry, runs) = scripted(Outcome::Fail);
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(10)));

    // claim and final write both landed, yet neither wakes the controller
    let after = store.current();
    assert_ne!(after.resource_version(), before.resource_version());
    assert_eq!(after.status.as_ref().map(|s| s.count), Some(1));
    assert_eq!(reconcile_trigger(&after), reconcile_trigger(&before));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let mut with_feedback = after.clone();
    annotate(&mut with_feedback, FEEDBACK_ANNOTATION, r#"{"name": "gen-ai-1"}"#);
    assert_ne!(reconcile_trigger(&with_feedback), reconcile_trigger(&after));
}

#[tokio::test]
async fn workflows_run_in_declared_order_and_the_last_outcome_wins() {
    let store = Arc::new(MemoryStore::with(support(
        1,
        None,
        vec![workflow("summarize", 3), workflow("gen-ai", 3)],
    )));
    let (registry, trail) =
        scripted_many(&[("summarize", Outcome::Complete(100)), ("gen-ai", Outcome::Fail)]);
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(*trail.lock().unwrap(), vec!["summarize", "gen-ai"]);
    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Failed));
    let names: Vec<_> = status.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["gen-ai-100"]);
    assert_eq!(status.observed_generation, 0);
}

#[tokio::test]
async fn unknown_workflow_is_overridden_by_a_later_completion() {
    let store = Arc::new(MemoryStore::with(support(
        1,
        None,
        vec![workflow("chaos", 3), workflow("gen-ai", 3)],
    )));
    let (registry, trail) = scripted_many(&[("gen-ai", Outcome::Complete(100))]);
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(*trail.lock().unwrap(), vec!["gen-ai"]);
    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Completed));
    assert_eq!(status.results.len(), 1);
    assert_eq!(status.observed_generation, 1);
}

#[tokio::test]
async fn exhausted_workflow_is_skipped_while_later_ones_run() {
    // the claim brings count to 1, which exhausts a limit of 1
    let store = Arc::new(MemoryStore::with(support(
        1,
        None,
        vec![workflow("summarize", 1), workflow("gen-ai", 3)],
    )));
    let (registry, trail) = scripted_many(&[
        ("summarize", Outcome::Complete(100)),
        ("gen-ai", Outcome::Complete(200)),
    ]);
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(*trail.lock().unwrap(), vec!["gen-ai"]);
    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Completed));
    let names: Vec<_> = status.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["gen-ai-200"]);
}

#[tokio::test]
async fn exhausted_retry_budget_ends_in_error() {
    let status = SupportStatus {
        phase: Some(Phase::Failed),
        count: 2,
        results: vec![result(100)],
        ..SupportStatus::default()
    };
    let store = Arc::new(MemoryStore::with(support(
        4,
        Some(status),
        vec![workflow("gen-ai", 3)],
    )));
    let (registry, runs) = scripted(Outcome::Complete(200));
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Error));
    assert_eq!(status.results.len(), 1);
    assert_eq!(status.count, 0);
    assert_eq!(status.observed_generation, 4);
}

#[tokio::test]
async fn running_workflow_is_retried_until_the_limit() {
    let store = Arc::new(MemoryStore::with(support(1, None, vec![workflow("gen-ai", 2)])));
    let (registry, runs) = scripted(Outcome::StayRunning);
    let ctx = context(store.clone(), registry);

    reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();
    assert_eq!(store.status().phase, Some(Phase::Running));
    assert_eq!(store.status().count, 1);

    reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();
    assert_eq!(store.status().phase, Some(Phase::Error));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // settled now
    let writes = store.total_writes();
    reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();
    assert_eq!(store.total_writes(), writes);
}

#[tokio::test]
async fn unknown_workflow_fails_and_requeues() {
    let store = Arc::new(MemoryStore::with(support(1, None, vec![workflow("chaos", 3)])));
    let (registry, runs) = scripted(Outcome::Complete(100));
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    assert_eq!(store.status().phase, Some(Phase::Failed));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn feedback_is_attached_without_touching_phase() {
    let status = SupportStatus {
        phase: Some(Phase::Completed),
        observed_generation: 1,
        count: 0,
        results: vec![result(200), result(100)],
        ..SupportStatus::default()
    };
    let mut support = support(2, Some(status), vec![workflow("gen-ai", 3)]);
    annotate(
        &mut support,
        FEEDBACK_ANNOTATION,
        r#"{"name": "gen-ai-100", "user": "dev", "vote": "down", "message": "wrong pod"}"#,
    );
    let store = Arc::new(MemoryStore::with(support));
    let (registry, runs) = scripted(Outcome::Complete(300));
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(store.merge_patches.load(Ordering::SeqCst), 1);

    let current = store.current();
    assert!(!current.annotations().contains_key(FEEDBACK_ANNOTATION));

    let status = current.status.unwrap();
    assert_eq!(status.phase, Some(Phase::Completed));
    assert_eq!(status.count, 0);
    assert_eq!(status.results.len(), 2);
    assert!(status.results[0].feedback.is_none());
    let feedback = status.results[1].feedback.as_ref().unwrap();
    assert!(feedback.down_vote);
    assert_eq!(feedback.feedback_msg, "wrong pod");
}

#[tokio::test]
async fn invalid_feedback_is_ignored() {
    let status = SupportStatus {
        phase: Some(Phase::Failed),
        count: 1,
        results: vec![result(100)],
        ..SupportStatus::default()
    };
    let mut support = support(1, Some(status), vec![workflow("gen-ai", 3)]);
    annotate(&mut support, FEEDBACK_ANNOTATION, "thumbs up");
    let store = Arc::new(MemoryStore::with(support));
    let (registry, _) = scripted(Outcome::Complete(300));
    let ctx = context(store.clone(), registry);

    reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Failed));
    assert_eq!(status.count, 1);
    assert!(status.results[0].feedback.is_none());
    assert_eq!(store.merge_patches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deletion_removes_the_finalizer() {
    let mut support = support(1, None, vec![workflow("gen-ai", 3)]);
    support.metadata.finalizers = Some(vec![
        "other.example.com/keep".to_string(),
        SUPPORT_FINALIZER_NAME.to_string(),
    ]);
    support.metadata.deletion_timestamp = Some(Time(Utc::now()));
    let store = Arc::new(MemoryStore::with(support));
    let (registry, runs) = scripted(Outcome::Complete(100));
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(store.current().finalizers(), ["other.example.com/keep"]);
    assert_eq!(store.status_writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn conflicting_writes_are_retried() {
    let mut support = support(1, None, vec![workflow("gen-ai", 3)]);
    support.metadata.finalizers = Some(vec![SUPPORT_FINALIZER_NAME.to_string()]);
    let store = Arc::new(MemoryStore::with(support));
    store.inject_conflicts(2);
    let (registry, _) = scripted(Outcome::Complete(100));
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Completed));
    assert_eq!(status.results.len(), 1);
}

#[tokio::test]
async fn persistent_conflicts_surface_as_errors() {
    let mut support = support(1, None, vec![workflow("gen-ai", 3)]);
    support.metadata.finalizers = Some(vec![SUPPORT_FINALIZER_NAME.to_string()]);
    let store = Arc::new(MemoryStore::with(support));
    store.inject_conflicts(u32::MAX);
    let (registry, runs) = scripted(Outcome::Complete(100));
    let ctx = context(store.clone(), registry);

    let err = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn analysis_outage_marks_support_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(500).set_body_string("unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let mut support = support(1, None, vec![workflow("gen-ai", 3)]);
    annotate(&mut support, APP_STATUS_ANNOTATION, r#"{"health": {"status": "Degraded"}}"#);
    let store = Arc::new(MemoryStore::with(support));
    let registry = WorkflowRegistry::new().with(
        GENAI_WORKFLOW,
        Arc::new(MockGenAiFactory {
            base_url: server.uri(),
        }),
    );
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Failed));
    assert!(status.results.is_empty());
}

#[tokio::test]
async fn analysis_summary_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "analyses": [{"analysis": "The new image tag cannot be pulled."}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut support = support(1, None, vec![workflow("gen-ai", 3)]);
    annotate(&mut support, APP_STATUS_ANNOTATION, r#"{"health": {"status": "Degraded"}}"#);
    let store = Arc::new(MemoryStore::with(support));
    let registry = WorkflowRegistry::new().with(
        GENAI_WORKFLOW,
        Arc::new(MockGenAiFactory {
            base_url: server.uri(),
        }),
    );
    let ctx = context(store.clone(), registry);

    let action = reconcile_key(NAMESPACE, NAME, &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    let status = store.status();
    assert_eq!(status.phase, Some(Phase::Completed));
    assert_eq!(status.observed_generation, 1);
    assert_eq!(status.results.len(), 1);
    assert_eq!(
        status.results[0].summary.main_summary,
        "The new image tag cannot be pulled."
    );
    assert_eq!(status.results[0].help.slack_channel, "#argo-support");
    assert_eq!(status.results[0].message, "Gen AI request completed");
}
