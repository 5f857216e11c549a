//! Drives a [`ProgressTracker`] with real I/O and timers.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt;
use tokio::time::{sleep_until, timeout, Instant};

use crate::error::ClientError;
use crate::feed::{PushEvent, PushStream, TaskFeed};
use crate::snapshot::TaskSnapshot;
use crate::tracker::{Action, ChannelId, ProgressTracker, TrackerConfig};

/// Follows tasks until they reach a terminal status.
#[derive(Clone)]
pub struct TaskWatcher {
    feed: Arc<dyn TaskFeed>,
    config: TrackerConfig,
}

/// What woke the driver loop.
enum Wake {
    Push(ChannelId, Option<Result<PushEvent, ClientError>>),
    Liveness(ChannelId),
    Reconnect(ChannelId),
    Poll,
}

impl TaskWatcher {
    pub fn new(feed: Arc<dyn TaskFeed>, config: TrackerConfig) -> Self {
        Self { feed, config }
    }

    /// Follow `task_id` until it finishes, calling `on_update` for every
    /// newer snapshot (the terminal one included).
    ///
    /// Returns the terminal snapshot, or [`ClientError::Unreachable`] when
    /// both the stream and polling gave up.
    pub async fn watch<F>(&self, task_id: &str, mut on_update: F) -> Result<TaskSnapshot, ClientError>
    where
        F: FnMut(&TaskSnapshot),
    {
        let mut tracker = ProgressTracker::new(self.config.clone());
        let mut pending: VecDeque<Action> = tracker.start().into();

        let mut stream: Option<(ChannelId, PushStream)> = None;
        let mut liveness: Option<(ChannelId, Instant)> = None;
        let mut reconnect: Option<(ChannelId, Instant)> = None;
        let mut poll_at: Option<Instant> = None;

        loop {
            while let Some(action) = pending.pop_front() {
                match action {
                    Action::Open { channel } => {
                        tracing::debug!(task_id = %task_id, state = ?tracker.state(), "Opening progress stream");
                        let opened = timeout(self.config.liveness_timeout, self.feed.open(task_id)).await;
                        let followups = match opened {
                            Ok(Ok(s)) => {
                                stream = Some((channel, s));
                                tracker.on_open(channel)
                            }
                            Ok(Err(e)) => {
                                tracing::warn!(task_id = %task_id, error = %e, "Progress stream failed to open");
                                tracker.on_transport_error(channel, &e.to_string())
                            }
                            Err(_) => {
                                tracing::warn!(task_id = %task_id, "Progress stream did not open in time");
                                tracker.on_transport_error(channel, "stream did not open within the liveness timeout")
                            }
                        };
                        pending.extend(followups);
                    }
                    Action::ArmLiveness { channel, after } => {
                        liveness = Some((channel, Instant::now() + after));
                    }
                    Action::Close { channel } => {
                        if stream.as_ref().is_some_and(|(ch, _)| *ch == channel) {
                            stream = None;
                        }
                        if liveness.is_some_and(|(ch, _)| ch == channel) {
                            liveness = None;
                        }
                    }
                    Action::ScheduleReconnect { channel, delay } => {
                        tracing::info!(task_id = %task_id, state = ?tracker.state(), delay_ms = delay.as_millis() as u64, "Reconnecting progress stream");
                        reconnect = Some((channel, Instant::now() + delay));
                    }
                    Action::Poll { delay } => {
                        // Only the switch to polling asks for an immediate request.
                        if delay.is_zero() {
                            tracing::warn!(
                                task_id = %task_id,
                                error = tracker.last_error().unwrap_or_default(),
                                "Progress stream unavailable, falling back to polling",
                            );
                        }
                        poll_at = Some(Instant::now() + delay);
                    }
                    Action::Emit(snapshot) => on_update(&snapshot),
                    Action::Finish(snapshot) => {
                        on_update(&snapshot);
                        tracing::info!(
                            task_id = %task_id,
                            status = %snapshot.status,
                            discarded = tracker.discarded(),
                            "Task finished",
                        );
                        return Ok(snapshot);
                    }
                    Action::GiveUp { reason } => {
                        tracing::error!(task_id = %task_id, reason = %reason, "Lost track of task");
                        return Err(ClientError::Unreachable(reason));
                    }
                }
            }

            let wake = tokio::select! {
                (channel, item) = next_push(&mut stream) => Wake::Push(channel, item),
                channel = expire(liveness) => Wake::Liveness(channel),
                channel = expire(reconnect) => Wake::Reconnect(channel),
                () = until(poll_at) => Wake::Poll,
            };

            let followups = match wake {
                Wake::Push(channel, Some(Ok(event))) => tracker.on_event(channel, event),
                Wake::Push(channel, Some(Err(e))) => {
                    tracing::warn!(task_id = %task_id, error = %e, "Progress stream broke");
                    tracker.on_transport_error(channel, &e.to_string())
                }
                Wake::Push(channel, None) => {
                    stream = None;
                    tracker.on_transport_error(channel, "stream ended before the task finished")
                }
                Wake::Liveness(channel) => {
                    liveness = None;
                    tracing::warn!(task_id = %task_id, "Progress stream went silent");
                    tracker.on_liveness_expired(channel)
                }
                Wake::Reconnect(channel) => {
                    reconnect = None;
                    tracker.on_reconnect_due(channel)
                }
                Wake::Poll => {
                    poll_at = None;
                    match self.feed.fetch(task_id).await {
                        Ok(snapshot) => tracker.on_poll_result(snapshot),
                        Err(e) => {
                            tracing::warn!(task_id = %task_id, error = %e, "Status request failed");
                            tracker.on_poll_failed(&e.to_string())
                        }
                    }
                }
            };
            pending.extend(followups);
        }
    }
}

async fn next_push(
    stream: &mut Option<(ChannelId, PushStream)>,
) -> (ChannelId, Option<Result<PushEvent, ClientError>>) {
    match stream {
        Some((channel, s)) => (*channel, s.next().await),
        None => std::future::pending().await,
    }
}

async fn expire(timer: Option<(ChannelId, Instant)>) -> ChannelId {
    match timer {
        Some((channel, at)) => {
            sleep_until(at).await;
            channel
        }
        None => std::future::pending().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
