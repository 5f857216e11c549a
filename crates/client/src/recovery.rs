//! Cold-start recovery for tasks a previous client session left active.
//!
//! After a restart the client may remember a task as `pending` or
//! `processing` with nothing following it. [`recover`] asks the server
//! with exponential backoff and reports whether to resume watching,
//! adopt the server's terminal record, or drop the stale entry.

use std::time::Duration;

use crate::feed::TaskFeed;
use crate::snapshot::TaskSnapshot;

/// Tunable parameters for the recovery backoff.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    /// Status requests before the local entry is cleared.
    pub max_attempts: u32,
    /// Delay after the first failed request.
    pub initial_delay: Duration,
    /// Upper bound on the delay between requests.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay, clamped to [`RecoveryPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &RecoveryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// What to do with a task remembered from a previous session.
#[derive(Debug, Clone, PartialEq)]
pub enum ColdStartOutcome {
    /// Still pending or processing on the server; watch it again.
    Resume(TaskSnapshot),
    /// Finished while the client was away; replace local state with this.
    Reconciled(TaskSnapshot),
    /// Unknown to the server or unreachable; forget the local entry.
    Cleared,
}

/// Resolve one remembered task against the server.
pub async fn recover(feed: &dyn TaskFeed, task_id: &str, policy: &RecoveryPolicy) -> ColdStartOutcome {
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.max_attempts {
        match feed.fetch(task_id).await {
            Ok(Some(snapshot)) if snapshot.is_terminal() => {
                tracing::info!(task_id = %task_id, status = %snapshot.status, "Reconciled finished task");
                return ColdStartOutcome::Reconciled(snapshot);
            }
            Ok(Some(snapshot)) => {
                tracing::info!(task_id = %task_id, status = %snapshot.status, "Resuming active task");
                return ColdStartOutcome::Resume(snapshot);
            }
            Ok(None) => {
                tracing::info!(task_id = %task_id, "Remembered task no longer exists");
                return ColdStartOutcome::Cleared;
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %task_id,
                    error = %e,
                    "Recovery attempt {attempt}/{} failed",
                    policy.max_attempts,
                );
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(delay).await;
            delay = next_delay(delay, policy);
        }
    }

    tracing::warn!(task_id = %task_id, "Giving up on remembered task, clearing it");
    ColdStartOutcome::Cleared
}
