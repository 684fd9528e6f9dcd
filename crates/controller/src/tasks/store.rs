//! Resource store access for `Support` objects.
//!
//! All writes that depend on previously read state carry the
//! `metadata.resourceVersion` they were computed from, so the API server
//! rejects them with 409 when another writer got there first.

use crate::crds::Support;
use crate::tasks::types::{Error, Result};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::{json, Map, Value};
use tracing::debug;

#[async_trait]
pub trait SupportStore: Send + Sync {
    /// Load a `Support`; `Ok(None)` when it no longer exists
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Support>>;

    /// Write the full status, guarded by the object's resource version
    async fn update_status(&self, support: &Support) -> Result<Support>;

    /// Merge-patch the status difference between `original` and `updated`
    async fn merge_patch_status(&self, original: &Support, updated: &Support) -> Result<()>;

    /// Replace the finalizer list, guarded by the object's resource version
    async fn set_finalizers(&self, support: &Support, finalizers: Vec<String>) -> Result<Support>;

    /// Drop an annotation from the object
    async fn clear_annotation(&self, support: &Support, key: &str) -> Result<()>;
}

/// Status fields that changed between two copies, as a JSON merge patch body.
/// Removed fields are set to null.
pub fn status_merge_patch(original: &Support, updated: &Support) -> Result<Value> {
    let before = serde_json::to_value(&original.status)?;
    let after = serde_json::to_value(&updated.status)?;

    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let mut diff = Map::new();
    for (key, value) in after {
        if before.get(key) != Some(value) {
            diff.insert(key.clone(), value.clone());
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            diff.insert(key.clone(), Value::Null);
        }
    }

    Ok(json!({ "status": diff }))
}

fn object_key(support: &Support) -> Result<(String, String)> {
    let name = support.metadata.name.clone().ok_or(Error::MissingObjectKey)?;
    let namespace = support.namespace().ok_or(Error::MissingObjectKey)?;
    Ok((namespace, name))
}

/// Metadata fragment pinning the write to the version the object was read at
fn version_guard(support: &Support) -> Map<String, Value> {
    let mut metadata = Map::new();
    if let Some(version) = support.resource_version() {
        metadata.insert("resourceVersion".to_string(), Value::String(version));
    }
    metadata
}

fn map_write_error(err: kube::Error, name: &str) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 409 => Error::Conflict {
            name: name.to_string(),
        },
        other => Error::KubeError(other),
    }
}

/// `SupportStore` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSupportStore {
    client: Client,
}

impl KubeSupportStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Support> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SupportStore for KubeSupportStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Support>> {
        match self.api(namespace).get(name).await {
            Ok(support) => Ok(Some(support)),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(&self, support: &Support) -> Result<Support> {
        let (namespace, name) = object_key(support)?;
        let patch = json!({
            "metadata": version_guard(support),
            "status": support.status,
        });

        debug!(support = %name, namespace = %namespace, "Writing Support status");
        self.api(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, &name))
    }

    async fn merge_patch_status(&self, original: &Support, updated: &Support) -> Result<()> {
        let (namespace, name) = object_key(updated)?;
        let patch = status_merge_patch(original, updated)?;

        self.api(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, &name))?;
        Ok(())
    }

    async fn set_finalizers(&self, support: &Support, finalizers: Vec<String>) -> Result<Support> {
        let (namespace, name) = object_key(support)?;
        let mut metadata = version_guard(support);
        metadata.insert("finalizers".to_string(), json!(finalizers));
        let patch = json!({ "metadata": metadata });

        self.api(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, &name))
    }

    async fn clear_annotation(&self, support: &Support, key: &str) -> Result<()> {
        let (namespace, name) = object_key(support)?;
        let mut annotations = Map::new();
        annotations.insert(key.to_string(), Value::Null);
        let patch = json!({ "metadata": { "annotations": annotations } });

        self.api(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, &name))?;
        Ok(())
    }
}
