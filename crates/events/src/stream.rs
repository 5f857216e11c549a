//! Server side of the progress protocol for one task.
//!
//! The stream subscribes before reading the current record, so no update
//! published in between is lost. Every record is checked with
//! [`TaskWithImages::supersedes`] before it is emitted, which keeps the
//! output free of duplicates and regressions even when a resync from the
//! store races with the channel.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use imagegen_db::models::TaskWithImages;
use imagegen_db::TaskStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::hub::TaskEventHub;

/// Smallest heartbeat interval accepted.
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// One item of a task progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressFrame {
    /// The task record changed. The last update of a stream carries a
    /// terminal status unless the stream was cut short.
    Update(TaskWithImages),
    /// Liveness heartbeat; carries no news.
    Ping,
    /// The task does not exist. Always the only frame.
    NotFound,
}

enum Step {
    Ping,
    Record(TaskWithImages),
    Resync,
    Closed,
}

/// Ordered progress frames for `task_id`, with a [`ProgressFrame::Ping`]
/// every `heartbeat` whether or not updates are flowing.
///
/// Ends right after the terminal record, after [`ProgressFrame::NotFound`],
/// or when the hub shuts down.
pub fn task_progress_stream(
    hub: Arc<TaskEventHub>,
    store: Arc<dyn TaskStore>,
    task_id: String,
    heartbeat: Duration,
) -> impl Stream<Item = ProgressFrame> + Send + 'static {
    async_stream::stream! {
        let mut rx = hub.subscribe(&task_id).await;

        let mut last = match store.get_task(&task_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                yield ProgressFrame::NotFound;
                return;
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Failed to load task for stream");
                return;
            }
        };
        yield ProgressFrame::Update(last.clone());
        if last.is_terminal() {
            return;
        }

        let heartbeat = heartbeat.max(MIN_HEARTBEAT);
        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                _ = ticker.tick() => Step::Ping,
                received = rx.recv() => match received {
                    Ok(record) => Step::Record(record),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(task_id = %task_id, skipped, "Progress subscriber lagged, resyncing");
                        Step::Resync
                    }
                    Err(RecvError::Closed) => Step::Closed,
                },
            };

            let closed = matches!(step, Step::Closed);
            let candidate = match step {
                Step::Ping => {
                    yield ProgressFrame::Ping;
                    continue;
                }
                Step::Record(record) => Some(record),
                Step::Resync | Step::Closed => match store.get_task(&task_id).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!(task_id = %task_id, error = %e, "Failed to resync task");
                        None
                    }
                },
            };

            if let Some(record) = candidate {
                if record.supersedes(&last) {
                    last = record;
                    yield ProgressFrame::Update(last.clone());
                    if last.is_terminal() {
                        return;
                    }
                }
            }

            if closed {
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
