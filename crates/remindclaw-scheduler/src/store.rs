//! Task store contract and the in-memory backend.
//!
//! Lookups are by due minute, not "due at or before": a task whose minute was
//! missed (dispatcher down, or saved already in the past) is never fired late.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use remindclaw_core::error::Result;
use tokio::sync::Mutex;

use crate::tasks::{DeadLetter, NotificationTask, NotificationTaskDraft, TaskId, truncate_to_minute};

/// Persistence backend for pending reminders.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Assign an id and persist the draft.
    async fn save(&self, draft: NotificationTaskDraft) -> Result<NotificationTask>;

    /// All pending tasks due in the same minute as `minute`. Unordered.
    async fn find_due_at(&self, minute: NaiveDateTime) -> Result<Vec<NotificationTask>>;

    /// Atomically delete the task. Returns `true` only for the caller whose
    /// call removed it, so two dispatchers can never both own a task.
    async fn claim(&self, id: TaskId) -> Result<bool>;

    /// Idempotent delete.
    async fn remove(&self, id: TaskId) -> Result<()> {
        self.claim(id).await.map(|_| ())
    }

    /// Every pending task, earliest first.
    async fn list_pending(&self) -> Result<Vec<NotificationTask>>;

    /// Keep a record of a delivery that failed.
    async fn record_dead_letter(&self, task: &NotificationTask, reason: &str) -> Result<()>;
}

/// Process-local store. Lost on restart.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    tasks: BTreeMap<TaskId, NotificationTask>,
    dead_letters: Vec<DeadLetter>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dead letters recorded so far.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock().await.dead_letters.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, draft: NotificationTaskDraft) -> Result<NotificationTask> {
        let mut state = self.inner.lock().await;
        state.next_id += 1;
        let task = NotificationTask::from_draft(TaskId(state.next_id), draft);
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_due_at(&self, minute: NaiveDateTime) -> Result<Vec<NotificationTask>> {
        let minute = truncate_to_minute(minute);
        let state = self.inner.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.due_minute() == minute)
            .cloned()
            .collect())
    }

    async fn claim(&self, id: TaskId) -> Result<bool> {
        Ok(self.inner.lock().await.tasks.remove(&id).is_some())
    }

    async fn list_pending(&self) -> Result<Vec<NotificationTask>> {
        let state = self.inner.lock().await;
        let mut tasks: Vec<_> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (t.due_at, t.id));
        Ok(tasks)
    }

    async fn record_dead_letter(&self, task: &NotificationTask, reason: &str) -> Result<()> {
        self.inner.lock().await.dead_letters.push(DeadLetter {
            task: task.clone(),
            reason: reason.to_string(),
            failed_at: chrono::Local::now().naive_local(),
        });
        Ok(())
    }
}
