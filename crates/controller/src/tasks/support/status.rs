//! Pure status transitions for `Support` reconciliation.

use crate::crds::{AnalysisResult, Phase, Support, SupportStatus};
use crate::workflows::FeedbackUpdate;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Results kept on the resource, newest first
pub const MAX_RESULTS: usize = 2;

/// Whether the current generation still needs work.
///
/// Running and failed resources are always picked up again so that an
/// interrupted or failed pass can recover without a spec change.
#[must_use]
pub fn needs_reconcile(support: &Support) -> bool {
    let status = support.status.as_ref();
    let phase = status.and_then(|s| s.phase);
    let observed = status.map_or(0, |s| s.observed_generation);

    phase.is_some_and(Phase::is_recovering) || support.generation() != observed
}

/// Fingerprint of the fields that should wake the controller: the spec
/// generation, the deletion marker and the feedback annotation.
///
/// Status writes leave it unchanged, so a failed pass is picked up again only
/// through its requeue delay.
#[must_use]
pub fn reconcile_trigger(support: &Support) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    support.metadata.generation.hash(&mut hasher);
    support.is_being_deleted().hash(&mut hasher);
    support.feedback_annotation().hash(&mut hasher);
    Some(hasher.finish())
}

/// Claim the resource for this pass
pub fn mark_running(status: &mut SupportStatus) {
    status.phase = Some(Phase::Running);
    status.last_transition_time = Some(chrono::Utc::now());
    status.count += 1;
}

/// Newest `finishedAt` first, unfinished results last, then keep `MAX_RESULTS`
pub fn sort_and_truncate_results(results: &mut Vec<AnalysisResult>) {
    results.sort_by(|a, b| match (a.finished_at, b.finished_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    results.truncate(MAX_RESULTS);
}

/// Attach feedback to the result it names. Returns false when no result matches.
pub fn apply_feedback(status: &mut SupportStatus, update: &FeedbackUpdate) -> bool {
    match status
        .results
        .iter_mut()
        .find(|result| result.name == update.result_name)
    {
        Some(result) => {
            result.feedback = Some(update.feedback.clone());
            true
        }
        None => false,
    }
}

/// A terminal phase settles the generation and resets the attempt counter
pub fn settle(status: &mut SupportStatus, generation: i64) {
    if status.phase.is_some_and(Phase::is_terminal) {
        status.count = 0;
        status.observed_generation = generation;
    }
}
