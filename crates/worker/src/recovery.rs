//! Startup reconciliation.
//!
//! A task can only make progress inside the process that queued it. Any
//! task still `pending` or `processing` when a new process starts was
//! abandoned and is finalized from what it had produced.

use imagegen_db::repositories::TaskRepo;
use imagegen_db::DbPool;

/// Finalize tasks a previous process left unfinished. Returns their ids.
///
/// Must run before the pool accepts work, or it would finalize tasks
/// that are legitimately queued.
pub async fn reconcile_interrupted(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
    let touched = TaskRepo::reconcile_interrupted(pool).await?;
    if touched.is_empty() {
        tracing::debug!("No interrupted tasks to reconcile");
    } else {
        tracing::warn!(count = touched.len(), "Reconciled tasks interrupted by restart");
    }
    Ok(touched)
}
