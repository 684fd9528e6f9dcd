//! `DiagnosticSource` backed by the Kubernetes API

use super::{
    AnalysisRunSummary, DiagnosticError, DiagnosticSource, RolloutSummary,
    ROLLOUT_POD_HASH_LABEL, ROLLOUT_REVISION_ANNOTATION,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Pod, PodStatus};
use kube::api::{ListParams, LogParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client, ResourceExt};
use serde_json::Value;
use tracing::debug;

const ROLLOUTS_GROUP: &str = "argoproj.io";
const ROLLOUTS_VERSION: &str = "v1alpha1";

/// Only the recent end of a pod log is scanned for errors
const LOG_TAIL_LINES: i64 = 500;
const LOG_LIMIT_BYTES: i64 = 1024 * 1024;

#[derive(Clone)]
pub struct KubeDiagnostics {
    client: Client,
    rollouts: ApiResource,
    analysis_runs: ApiResource,
}

impl KubeDiagnostics {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            rollouts: ApiResource::from_gvk(&GroupVersionKind::gvk(
                ROLLOUTS_GROUP,
                ROLLOUTS_VERSION,
                "Rollout",
            )),
            analysis_runs: ApiResource::from_gvk(&GroupVersionKind::gvk(
                ROLLOUTS_GROUP,
                ROLLOUTS_VERSION,
                "AnalysisRun",
            )),
        }
    }

    fn dynamic(&self, namespace: &str, resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn recent_log_params() -> LogParams {
    LogParams {
        tail_lines: Some(LOG_TAIL_LINES),
        limit_bytes: Some(LOG_LIMIT_BYTES),
        ..LogParams::default()
    }
}

fn revision_of(object: &DynamicObject) -> Option<String> {
    object.annotations().get(ROLLOUT_REVISION_ANNOTATION).cloned()
}

fn status_of(object: &DynamicObject) -> Value {
    object.data.get("status").cloned().unwrap_or(Value::Null)
}

fn rollout_summary(object: &DynamicObject) -> RolloutSummary {
    let status = status_of(object);
    RolloutSummary {
        name: object.name_any(),
        current_pod_hash: status
            .get("currentPodHash")
            .and_then(Value::as_str)
            .map(str::to_string),
        revision: revision_of(object),
        status,
    }
}

fn analysis_run_summary(object: &DynamicObject) -> AnalysisRunSummary {
    AnalysisRunSummary {
        name: object.name_any(),
        revision: revision_of(object),
        created_at: object.metadata.creation_timestamp.as_ref().map(|t| t.0),
        status: status_of(object),
    }
}

#[async_trait]
impl DiagnosticSource for KubeDiagnostics {
    async fn list_rollouts(&self, namespace: &str) -> Result<Vec<RolloutSummary>, DiagnosticError> {
        let list = self
            .dynamic(namespace, &self.rollouts)
            .list(&ListParams::default())
            .await?;
        debug!(namespace = %namespace, count = list.items.len(), "Listed rollouts");
        Ok(list.items.iter().map(rollout_summary).collect())
    }

    async fn list_pods_for_hash(
        &self,
        namespace: &str,
        hash: &str,
    ) -> Result<Vec<String>, DiagnosticError> {
        let params = ListParams::default().labels(&format!("{ROLLOUT_POD_HASH_LABEL}={hash}"));
        let list = self.pods(namespace).list(&params).await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String, DiagnosticError> {
        Ok(self.pods(namespace).logs(pod, &recent_log_params()).await?)
    }

    async fn pod_status(&self, namespace: &str, pod: &str) -> Result<PodStatus, DiagnosticError> {
        let pod = self.pods(namespace).get(pod).await?;
        Ok(pod.status.unwrap_or_default())
    }

    async fn list_analysis_runs(
        &self,
        namespace: &str,
    ) -> Result<Vec<AnalysisRunSummary>, DiagnosticError> {
        let list = self
            .dynamic(namespace, &self.analysis_runs)
            .list(&ListParams::default())
            .await?;
        Ok(list.items.iter().map(analysis_run_summary).collect())
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>, DiagnosticError> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        Ok(events.list(&ListParams::default()).await?.items)
    }
}
