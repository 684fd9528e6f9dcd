use crate::crds::Feedback;
use crate::workflows::{FeedbackUpdate, WorkflowError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Vote {
    Up,
    Down,
}

/// Feedback annotation value as written by the UI
#[derive(Debug, Deserialize)]
struct FeedbackPayload {
    /// Name of the result being rated
    name: String,
    #[serde(default)]
    user: String,
    vote: Vote,
    #[serde(default)]
    message: String,
}

/// Parse the feedback annotation into the update for the rated result
pub fn parse_feedback(raw: &str) -> Result<FeedbackUpdate, WorkflowError> {
    let cleaned = raw.replace('\n', "");
    let payload: FeedbackPayload = serde_json::from_str(&cleaned)
        .map_err(|e| WorkflowError::InvalidFeedback(e.to_string()))?;

    if payload.name.trim().is_empty() {
        return Err(WorkflowError::InvalidFeedback(
            "result name must not be empty".to_string(),
        ));
    }

    debug!(result = %payload.name, user = %payload.user, vote = ?payload.vote, "Parsed feedback");

    Ok(FeedbackUpdate {
        result_name: payload.name,
        feedback: Feedback {
            up_vote: payload.vote == Vote::Up,
            down_vote: payload.vote == Vote::Down,
            feedback_msg: payload.message,
        },
    })
}
