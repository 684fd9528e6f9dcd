use crate::crds::Support;
use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{error, info, instrument, Instrument};

pub mod config;
pub mod retry;
pub mod store;
pub mod support;
pub mod types;

// Re-export commonly used items
pub use config::ControllerConfig;
pub use retry::{retry_on_conflict, RetryPolicy};
pub use store::{KubeSupportStore, SupportStore};
pub use support::status::reconcile_trigger;
pub use support::{reconcile_key, reconcile_support};
pub use types::{Context, Error, Result};

/// Watch `Support` resources and reconcile them until the stream ends
#[instrument(skip(client, context), fields(namespace = ?context.config.namespace))]
pub async fn run_support_controller(client: Client, context: Arc<Context>) -> Result<()> {
    let supports: Api<Support> = match context.config.namespace.as_deref() {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    // Startup visibility: what the controller is about to observe
    match supports.list(&ListParams::default()).await {
        Ok(list) => {
            info!("Controller startup: found {} Support(s)", list.items.len());
            for support in list.items {
                info!(
                    "Existing Support: name={}, namespace={}, phase={:?}",
                    support.name_any(),
                    support.namespace().unwrap_or_default(),
                    support.phase()
                );
            }
        }
        Err(e) => {
            error!("Failed to list Supports at startup: {}", e);
        }
    }

    info!(
        workflows = ?context.registry.names(),
        "Starting Support controller"
    );

    // Only spec, deletion and feedback changes trigger a pass. Our own status
    // writes are filtered out so failed passes wait for their requeue delay.
    let (reader, writer) = reflector::store();
    let triggers = watcher(supports, watcher::Config::default().any_semantic())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(reconcile_trigger);

    Controller::for_stream(triggers, reader)
        .run(reconcile_support, error_policy, context)
        .for_each(|reconciliation_result| {
            let span = tracing::info_span!("support_reconciliation_result");
            async move {
                match reconciliation_result {
                    Ok(support) => {
                        info!(resource = ?support, "Support reconciliation successful");
                    }
                    Err(reconciliation_err) => {
                        error!(error = ?reconciliation_err, "Support reconciliation error");
                    }
                }
            }
            .instrument(span)
        })
        .await;

    info!("Support controller shutting down");
    Ok(())
}

/// Store failures and exhausted conflict retries come back after the failed delay
#[instrument(skip(support, ctx), fields(support = %support.name_any(), namespace = ?support.namespace()))]
fn error_policy(support: Arc<Support>, err: &Error, ctx: Arc<Context>) -> Action {
    error!(error = ?err, "Support reconciliation failed, requeueing");
    ctx.metrics.record_failure();
    Action::requeue(ctx.config.failed_requeue_delay())
}
