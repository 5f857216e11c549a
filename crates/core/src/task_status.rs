//! Task lifecycle states and the rules that govern moving between them.
//!
//! ```text
//! pending ──► processing ──► completed | partial | failed
//!    │
//!    └──────► failed            (admission / resolution failure)
//! ```
//!
//! Terminal states never change once reached.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Some images were produced, at least one attempt failed.
    Partial,
}

/// Every status, in lifecycle order.
pub const ALL_STATUSES: [TaskStatus; 5] = [
    TaskStatus::Pending,
    TaskStatus::Processing,
    TaskStatus::Completed,
    TaskStatus::Failed,
    TaskStatus::Partial,
];

/// Every status that ends a task.
pub const TERMINAL_STATUSES: [TaskStatus; 3] =
    [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Partial];

impl TaskStatus {
    /// Database / wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    /// Parse from the database / wire name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "partial" => Ok(Self::Partial),
            other => Err(CoreError::Validation(format!(
                "Unknown task status '{other}'"
            ))),
        }
    }

    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self)
    }

    /// Ordering used to reject regressions: pending < processing < terminal.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed | Self::Partial => 2,
        }
    }

    /// Whether a record in `self` may be written with status `next`.
    ///
    /// Re-writing the same non-terminal status is allowed (in-place
    /// progress updates keep `processing`).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (Self::Pending, Self::Pending | Self::Processing | Self::Failed) => true,
            (Self::Processing, Self::Processing) => true,
            (Self::Processing, to) => to.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

/// Compute the terminal status once every attempt of a batch has been made.
///
/// - every requested image produced -> `completed`
/// - nothing produced -> `failed`
/// - anything in between -> `partial`
pub fn terminal_status(completed_count: u32, total_count: u32) -> TaskStatus {
    if completed_count == 0 {
        TaskStatus::Failed
    } else if completed_count >= total_count {
        TaskStatus::Completed
    } else {
        TaskStatus::Partial
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
