use crate::tasks::config::ControllerConfig;
use crate::tasks::store::SupportStore;
use crate::workflows::WorkflowRegistry;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use crate::crds::SUPPORT_FINALIZER_NAME;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Conflict updating Support {name}: resource version is stale")]
    Conflict { name: String },

    #[error("Missing object key")]
    MissingObjectKey,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Optimistic-concurrency failure that a re-fetch can resolve
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::KubeError(kube::Error::Api(response)) => response.code == 409,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Counters exposed on the `/metrics` endpoint
#[derive(Debug, Default)]
pub struct ReconcileMetrics {
    reconciliations: AtomicU64,
    failures: AtomicU64,
    requeues: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reconciliations: u64,
    pub failures: u64,
    pub requeues: u64,
}

impl ReconcileMetrics {
    pub fn record_reconciliation(&self) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue(&self) {
        self.requeues.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            requeues: self.requeues.load(Ordering::Relaxed),
        }
    }
}

/// Shared state handed to every reconciliation
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn SupportStore>,
    pub registry: Arc<WorkflowRegistry>,
    pub config: Arc<ControllerConfig>,
    pub metrics: Arc<ReconcileMetrics>,
}
