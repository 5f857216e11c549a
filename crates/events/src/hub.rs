//! Per-task publish/subscribe hub.
//!
//! One `broadcast` channel exists per task id while anyone is subscribed.
//! Channels are dropped when the task reaches a terminal status (after the
//! final record is sent) or when the last subscriber has gone away.

use std::collections::HashMap;

use imagegen_db::models::TaskWithImages;
use tokio::sync::{broadcast, RwLock};

/// Default buffer capacity of each per-task channel.
const DEFAULT_CAPACITY: usize = 64;

/// Fan-out of task-record updates keyed by task id.
///
/// Shared via `Arc<TaskEventHub>` between the worker pool (publisher) and
/// the HTTP stream handlers (subscribers).
pub struct TaskEventHub {
    channels: RwLock<HashMap<String, broadcast::Sender<TaskWithImages>>>,
    capacity: usize,
}

impl TaskEventHub {
    /// Create a hub whose per-task channels buffer `capacity` records.
    ///
    /// A subscriber that falls further behind observes `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to updates of `task_id`, creating its channel if needed.
    pub async fn subscribe(&self, task_id: &str) -> broadcast::Receiver<TaskWithImages> {
        let mut channels = self.channels.write().await;
        channels
            .entry(task_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Push `record` to every subscriber of its task.
    ///
    /// Records are delivered in publish order. Returns how many subscribers
    /// received it; zero when nobody is listening.
    pub async fn publish(&self, record: TaskWithImages) -> usize {
        let task_id = record.task_id().to_string();
        let terminal = record.is_terminal();

        let mut channels = self.channels.write().await;
        let Some(sender) = channels.get(&task_id) else {
            return 0;
        };
        let delivered = sender.send(record).unwrap_or(0);

        // Receivers keep draining buffered records after the sender is gone,
        // so removing here still delivers the terminal record.
        if terminal || delivered == 0 {
            channels.remove(&task_id);
            tracing::debug!(task_id = %task_id, terminal, "Closed task progress channel");
        }
        delivered
    }

    /// Number of live subscribers of `task_id`.
    pub async fn subscriber_count(&self, task_id: &str) -> usize {
        self.channels
            .read()
            .await
            .get(task_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Number of tasks with an open channel.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Drop every channel. Subscribers observe `RecvError::Closed`.
    pub async fn close_all(&self) {
        let mut channels = self.channels.write().await;
        let count = channels.len();
        channels.clear();
        tracing::info!(count, "Closed all task progress channels");
    }
}

impl Default for TaskEventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
