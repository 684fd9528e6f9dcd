//! Argo CD application state, as captured by the UI or fetched from Argo CD

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HEALTH_STATUS_HEALTHY: &str = "Healthy";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Application {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    /// Kubernetes resources managed by the application
    #[serde(default)]
    pub resources: Vec<ResourceStatus>,

    #[serde(default)]
    pub sync: SyncStatus,

    #[serde(default)]
    pub health: HealthStatus,

    #[serde(default)]
    pub conditions: Vec<ApplicationCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    /// Sync status code of the resource
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStatus {
    #[serde(default)]
    pub status: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl HealthStatus {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTH_STATUS_HEALTHY
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCondition {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl ApplicationStatus {
    /// Healthy with nothing to report
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.health.is_healthy() && self.conditions.is_empty()
    }

    /// Managed resources reporting a health other than `Healthy`
    pub fn unhealthy_resources(&self) -> impl Iterator<Item = (&ResourceStatus, &HealthStatus)> {
        self.resources.iter().filter_map(|resource| {
            resource
                .health
                .as_ref()
                .filter(|health| !health.is_healthy())
                .map(|health| (resource, health))
        })
    }
}

impl Application {
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Whether there is any status worth reasoning about
    #[must_use]
    pub fn has_status(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| *status != ApplicationStatus::default())
    }
}

/// Parse the application-status annotation. Accepts either a full
/// application object or a bare status. Blank values yield `Ok(None)`.
pub fn parse_application_annotation(raw: &str) -> Result<Option<Application>, serde_json::Error> {
    let cleaned = raw.replace('\n', "");
    if cleaned.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(&cleaned)?;
    let is_application = value
        .as_object()
        .is_some_and(|object| object.contains_key("status") || object.contains_key("metadata"));

    if is_application {
        Ok(Some(serde_json::from_value(value)?))
    } else {
        let status: ApplicationStatus = serde_json::from_value(value)?;
        Ok(Some(Application {
            metadata: ObjectMeta::default(),
            status: Some(status),
        }))
    }
}
