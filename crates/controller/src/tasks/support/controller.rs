use super::status::{
    apply_feedback, mark_running, needs_reconcile, settle, sort_and_truncate_results,
};
use crate::crds::{Phase, Support, WorkflowSpec, FEEDBACK_ANNOTATION};
use crate::tasks::retry::retry_on_conflict;
use crate::tasks::types::{Context, Error, Result, SUPPORT_FINALIZER_NAME};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[instrument(skip(support, ctx), fields(support = %support.name_any(), namespace = ?support.namespace()))]
pub async fn reconcile_support(support: Arc<Support>, ctx: Arc<Context>) -> Result<Action> {
    ctx.metrics.record_reconciliation();

    let namespace = support.namespace().ok_or(Error::MissingObjectKey)?;
    let name = support.name_any();
    reconcile_key(&namespace, &name, &ctx).await
}

/// Run one reconciliation pass for the `Support` at `namespace/name`,
/// reading it fresh from the store.
pub async fn reconcile_key(namespace: &str, name: &str, ctx: &Context) -> Result<Action> {
    let Some(support) = ctx.store.get(namespace, name).await? else {
        debug!("Support no longer exists, nothing to do");
        return Ok(Action::await_change());
    };

    if support.is_being_deleted() {
        remove_finalizer(&support, ctx).await?;
        return Ok(Action::await_change());
    }

    if !needs_reconcile(&support) {
        debug!(
            generation = support.generation(),
            phase = ?support.phase(),
            "Support is up to date"
        );
        return Ok(Action::await_change());
    }

    let support = ensure_finalizer(support, ctx).await?;

    if support.spec.workflows.is_empty() {
        info!("Support declares no workflows");
        return Ok(Action::await_change());
    }

    let feedback_mode = support.feedback_annotation().is_some();
    let mut working = if feedback_mode {
        info!("Feedback annotation present, updating results");
        support
    } else {
        match claim(namespace, name, ctx).await? {
            Some(claimed) => claimed,
            None => return Ok(Action::await_change()),
        }
    };

    let generation = working.generation();
    let workflows = working.spec.workflows.clone();
    for workflow in &workflows {
        // Feedback never changes the phase, so the retry limit is not checked
        // in this mode.
        if feedback_mode {
            record_feedback(&mut working, workflow, namespace, ctx).await?;
            continue;
        }

        let count = working.status.as_ref().map_or(0, |s| s.count);
        if count >= workflow.retry_limit {
            warn!(
                workflow = %workflow.name,
                count,
                retry_limit = workflow.retry_limit,
                "Retry limit reached, giving up on workflow"
            );
            working.status_mut().phase = Some(Phase::Error);
            continue;
        }

        let executor = match ctx.registry.resolve(workflow, namespace).await {
            Ok(executor) => executor,
            Err(e) => {
                error!(workflow = %workflow.name, error = %e, "Unable to build workflow executor");
                working.status_mut().phase = Some(Phase::Failed);
                continue;
            }
        };

        match executor.run(&mut working).await {
            Err(e) => {
                warn!(workflow = %workflow.name, error = %e, "Workflow run failed");
                working.status_mut().phase = Some(Phase::Failed);
            }
            Ok(()) if working.phase() == Some(Phase::Running) => {
                debug!(workflow = %workflow.name, "Workflow still running");
            }
            Ok(()) => {
                let status = working.status_mut();
                sort_and_truncate_results(&mut status.results);
                status.last_transition_time = Some(chrono::Utc::now());
            }
        }
    }

    settle(working.status_mut(), generation);

    let Some(written) = write_status(&working, namespace, name, ctx).await? else {
        return Ok(Action::await_change());
    };

    if feedback_mode {
        ctx.store.clear_annotation(&written, FEEDBACK_ANNOTATION).await?;
    }

    let phase = written.phase();
    info!(phase = ?phase, "Reconciliation pass finished");

    if phase == Some(Phase::Failed) {
        ctx.metrics.record_requeue();
        return Ok(Action::requeue(ctx.config.failed_requeue_delay()));
    }
    Ok(Action::await_change())
}

async fn ensure_finalizer(support: Support, ctx: &Context) -> Result<Support> {
    if support.has_finalizer() {
        return Ok(support);
    }

    let mut finalizers = support.finalizers().to_vec();
    finalizers.push(SUPPORT_FINALIZER_NAME.to_string());
    debug!("Adding finalizer");
    ctx.store.set_finalizers(&support, finalizers).await
}

async fn remove_finalizer(support: &Support, ctx: &Context) -> Result<()> {
    if !support.has_finalizer() {
        return Ok(());
    }

    let finalizers = support
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != SUPPORT_FINALIZER_NAME)
        .cloned()
        .collect();
    info!("Support is being deleted, removing finalizer");
    ctx.store.set_finalizers(support, finalizers).await?;
    Ok(())
}

/// Mark the latest copy as running. `None` when it vanished meanwhile.
async fn claim(namespace: &str, name: &str, ctx: &Context) -> Result<Option<Support>> {
    let store = ctx.store.as_ref();
    retry_on_conflict(&ctx.config.retry, move || async move {
        let Some(mut latest) = store.get(namespace, name).await? else {
            return Ok(None);
        };
        mark_running(latest.status_mut());
        store.update_status(&latest).await.map(Some)
    })
    .await
}

/// Persist the computed status onto the latest copy. `None` when it vanished.
async fn write_status(
    working: &Support,
    namespace: &str,
    name: &str,
    ctx: &Context,
) -> Result<Option<Support>> {
    let store = ctx.store.as_ref();
    let computed = &working.status;
    retry_on_conflict(&ctx.config.retry, move || async move {
        let Some(mut latest) = store.get(namespace, name).await? else {
            return Ok(None);
        };
        latest.status.clone_from(computed);
        store.update_status(&latest).await.map(Some)
    })
    .await
}

/// Attach feedback for one workflow and merge-patch it onto the resource.
/// Executor and payload problems are logged; phase is never touched.
async fn record_feedback(
    working: &mut Support,
    workflow: &WorkflowSpec,
    namespace: &str,
    ctx: &Context,
) -> Result<()> {
    let executor = match ctx.registry.resolve(workflow, namespace).await {
        Ok(executor) => executor,
        Err(e) => {
            warn!(workflow = %workflow.name, error = %e, "Unable to build executor for feedback");
            return Ok(());
        }
    };

    let update = match executor.update_feedback(working).await {
        Ok(update) => update,
        Err(e) => {
            warn!(workflow = %workflow.name, error = %e, "Ignoring invalid feedback");
            return Ok(());
        }
    };

    let original = working.clone();
    if !apply_feedback(working.status_mut(), &update) {
        warn!(result = %update.result_name, "Feedback refers to an unknown result");
        return Ok(());
    }

    let store = ctx.store.as_ref();
    let (original, updated) = (&original, &*working);
    retry_on_conflict(&ctx.config.retry, move || {
        store.merge_patch_status(original, updated)
    })
    .await?;
    info!(result = %update.result_name, "Feedback recorded");
    Ok(())
}
