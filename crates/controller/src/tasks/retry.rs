//! Read-modify-write retries for optimistic-concurrency conflicts.

use crate::tasks::types::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

fn default_steps() -> u32 {
    5
}

fn default_initial_backoff_millis() -> u64 {
    10
}

fn default_factor() -> f64 {
    1.0
}

fn default_jitter() -> f64 {
    0.1
}

/// Bounded backoff applied between conflicting attempts
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    #[serde(default = "default_steps")]
    pub steps: u32,

    #[serde(default = "default_initial_backoff_millis")]
    pub initial_backoff_millis: u64,

    /// Multiplier applied to the backoff after each conflict
    #[serde(default = "default_factor")]
    pub factor: f64,

    /// Random extra delay, as a fraction of the current backoff
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            initial_backoff_millis: default_initial_backoff_millis(),
            factor: default_factor(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, jitter excluded
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_backoff_millis as f64 * self.factor.max(1.0).powi(exponent);
        Duration::from_millis(millis.min(u64::MAX as f64) as u64)
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        base + base.mul_f64(extra)
    }
}

/// Run `op` until it succeeds, fails with something other than a conflict,
/// or the policy runs out of steps. `op` must re-read whatever it writes.
pub async fn retry_on_conflict<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let steps = policy.steps.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Err(err) if err.is_conflict() && attempt + 1 < steps => {
                let delay = policy.jittered(policy.backoff(attempt));
                debug!(
                    attempt = attempt + 1,
                    steps,
                    delay_ms = delay.as_millis() as u64,
                    "Conflict writing Support, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
