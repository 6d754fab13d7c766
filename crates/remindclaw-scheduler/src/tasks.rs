//! Task definitions — the one persistent entity of the scheduler.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Store-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reminder before the store has given it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTaskDraft {
    pub chat_id: i64,
    pub message: String,
    pub due_at: NaiveDateTime,
}

/// A pending reminder. Never updated in place: it is created, then claimed
/// and removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTask {
    pub id: TaskId,
    /// Destination chat.
    pub chat_id: i64,
    /// Delivered verbatim.
    pub message: String,
    /// Only the minute is significant for dispatch.
    pub due_at: NaiveDateTime,
}

impl NotificationTask {
    pub fn from_draft(id: TaskId, draft: NotificationTaskDraft) -> Self {
        Self {
            id,
            chat_id: draft.chat_id,
            message: draft.message,
            due_at: draft.due_at,
        }
    }

    /// The dispatch key of this task.
    pub fn due_minute(&self) -> NaiveDateTime {
        truncate_to_minute(self.due_at)
    }
}

/// A task whose delivery failed under the dead-letter policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task: NotificationTask,
    pub reason: String,
    pub failed_at: NaiveDateTime,
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}
