//! State machine for following one task's progress.
//!
//! ```text
//!            open            transport error (budget left)
//! Connecting ────► Live ─────────────────────────► Degraded
//!     ▲                                               │
//!     └──────────────── reconnect due ────────────────┘
//!
//! any transport error past the budget ──► Polling ──► Lost
//! terminal snapshot from the current source ──► Finished
//! ```
//!
//! The tracker does no I/O. Every input returns the [`Action`]s the
//! driver must perform. Each opened stream gets a fresh [`ChannelId`];
//! inputs tagged with an older channel, and push events arriving after
//! the switch to polling, are discarded so an abandoned source can never
//! move the displayed state.

use std::time::Duration;

use imagegen_core::task_status::TaskStatus;

use crate::feed::PushEvent;
use crate::snapshot::TaskSnapshot;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing and budget knobs for [`ProgressTracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Stream reconnects allowed before switching to polling.
    pub retry_budget: u32,
    /// Delay before re-opening a failed stream.
    pub reconnect_delay: Duration,
    /// Delay between status requests while polling.
    pub poll_interval: Duration,
    /// Silence on the stream after which it is treated as dead. Must
    /// exceed the server heartbeat interval.
    pub liveness_timeout: Duration,
    /// Consecutive failed status requests before giving up.
    pub max_poll_failures: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retry_budget: 2,
            reconnect_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            liveness_timeout: Duration::from_secs(45),
            max_poll_failures: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// States, inputs, actions
// ---------------------------------------------------------------------------

/// Identifies one opened push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

/// Which source is currently allowed to update the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Push,
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    /// Not started.
    Idle,
    /// Stream requested, not yet confirmed open. `attempt` is 0 for the
    /// first connection.
    Connecting { attempt: u32 },
    Live,
    /// Stream failed, waiting to reconnect.
    Degraded { failures: u32 },
    Polling,
    Finished(TaskStatus),
    /// Polling failed too often or the task disappeared.
    Lost,
}

/// Side effects requested by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Open { channel: ChannelId },
    /// Restart the liveness timer for `channel`.
    ArmLiveness { channel: ChannelId, after: Duration },
    Close { channel: ChannelId },
    ScheduleReconnect { channel: ChannelId, delay: Duration },
    /// Request the task status after `delay`.
    Poll { delay: Duration },
    /// Show a newer snapshot.
    Emit(TaskSnapshot),
    /// The task reached a terminal status; stop everything.
    Finish(TaskSnapshot),
    GiveUp { reason: String },
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Pure progress state machine for one task.
#[derive(Debug)]
pub struct ProgressTracker {
    config: TrackerConfig,
    state: TrackerState,
    channel: ChannelId,
    next_channel: u64,
    transport_failures: u32,
    poll_failures: u32,
    last_error: Option<String>,
    last: Option<TaskSnapshot>,
    discarded: u64,
}

impl ProgressTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: TrackerState::Idle,
            channel: ChannelId(0),
            next_channel: 1,
            transport_failures: 0,
            poll_failures: 0,
            last_error: None,
            last: None,
            discarded: 0,
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn source(&self) -> UpdateSource {
        match self.state {
            TrackerState::Polling | TrackerState::Lost => UpdateSource::Poll,
            _ => UpdateSource::Push,
        }
    }

    /// Latest snapshot shown.
    pub fn last(&self) -> Option<&TaskSnapshot> {
        self.last.as_ref()
    }

    /// Reason of the most recent stream failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Inputs ignored because they came from a stale channel or a demoted
    /// source.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, TrackerState::Finished(_) | TrackerState::Lost)
    }

    /// Open the first stream.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state != TrackerState::Idle {
            return Vec::new();
        }
        self.connect(0)
    }

    pub fn on_open(&mut self, channel: ChannelId) -> Vec<Action> {
        if !self.accepts_push(channel) {
            return Vec::new();
        }
        if matches!(self.state, TrackerState::Connecting { .. }) {
            self.state = TrackerState::Live;
        }
        vec![self.arm_liveness()]
    }

    pub fn on_event(&mut self, channel: ChannelId, event: PushEvent) -> Vec<Action> {
        if !self.accepts_push(channel) {
            return Vec::new();
        }
        // An event proves the stream is open even if the open
        // confirmation has not been processed yet.
        if matches!(self.state, TrackerState::Connecting { .. }) {
            self.state = TrackerState::Live;
        }

        let mut actions = vec![self.arm_liveness()];
        if let PushEvent::Update(snapshot) = event {
            actions.extend(self.apply(snapshot));
            if self.is_done() {
                actions.push(Action::Close { channel });
            }
        }
        actions
    }

    pub fn on_transport_error(&mut self, channel: ChannelId, reason: &str) -> Vec<Action> {
        if !self.accepts_push(channel) {
            return Vec::new();
        }
        self.transport_failures += 1;
        self.last_error = Some(reason.to_string());

        let mut actions = vec![Action::Close { channel }];
        if self.transport_failures <= self.config.retry_budget {
            self.state = TrackerState::Degraded {
                failures: self.transport_failures,
            };
            actions.push(Action::ScheduleReconnect {
                channel,
                delay: self.config.reconnect_delay,
            });
        } else {
            self.state = TrackerState::Polling;
            actions.push(Action::Poll {
                delay: Duration::ZERO,
            });
        }
        actions
    }

    /// The stream stayed silent past the liveness timeout.
    pub fn on_liveness_expired(&mut self, channel: ChannelId) -> Vec<Action> {
        self.on_transport_error(channel, "no events within the liveness timeout")
    }

    pub fn on_reconnect_due(&mut self, channel: ChannelId) -> Vec<Action> {
        match self.state {
            TrackerState::Degraded { failures } if channel == self.channel => self.connect(failures),
            _ => {
                self.discarded += 1;
                Vec::new()
            }
        }
    }

    /// A status request answered. `None` means the task no longer exists.
    pub fn on_poll_result(&mut self, snapshot: Option<TaskSnapshot>) -> Vec<Action> {
        if self.state != TrackerState::Polling {
            self.discarded += 1;
            return Vec::new();
        }
        self.poll_failures = 0;

        let Some(snapshot) = snapshot else {
            self.state = TrackerState::Lost;
            return vec![Action::GiveUp {
                reason: "task no longer exists".to_string(),
            }];
        };

        let mut actions = self.apply(snapshot);
        if !self.is_done() {
            actions.push(Action::Poll {
                delay: self.config.poll_interval,
            });
        }
        actions
    }

    pub fn on_poll_failed(&mut self, reason: &str) -> Vec<Action> {
        if self.state != TrackerState::Polling {
            self.discarded += 1;
            return Vec::new();
        }
        self.poll_failures += 1;
        if self.poll_failures >= self.config.max_poll_failures {
            self.state = TrackerState::Lost;
            return vec![Action::GiveUp {
                reason: format!(
                    "status requests failed {} times in a row: {reason}",
                    self.poll_failures
                ),
            }];
        }
        vec![Action::Poll {
            delay: self.config.poll_interval,
        }]
    }

    // -- internals ----------------------------------------------------------

    fn connect(&mut self, attempt: u32) -> Vec<Action> {
        self.channel = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.state = TrackerState::Connecting { attempt };
        vec![
            Action::Open {
                channel: self.channel,
            },
            // Also bounds how long the connection attempt may take.
            self.arm_liveness(),
        ]
    }

    fn arm_liveness(&self) -> Action {
        Action::ArmLiveness {
            channel: self.channel,
            after: self.config.liveness_timeout,
        }
    }

    /// Push input is only accepted from the current channel while the
    /// stream is the update source.
    fn accepts_push(&mut self, channel: ChannelId) -> bool {
        let accepted = channel == self.channel
            && matches!(
                self.state,
                TrackerState::Connecting { .. } | TrackerState::Live
            );
        if !accepted {
            self.discarded += 1;
        }
        accepted
    }

    fn apply(&mut self, snapshot: TaskSnapshot) -> Vec<Action> {
        if let Some(last) = &self.last {
            if !snapshot.supersedes(last) {
                return Vec::new();
            }
        }
        self.last = Some(snapshot.clone());
        if snapshot.is_terminal() {
            self.state = TrackerState::Finished(snapshot.status);
            vec![Action::Finish(snapshot)]
        } else {
            vec![Action::Emit(snapshot)]
        }
    }
}
