//! Test doubles shared by the scheduler's unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use remindclaw_core::error::{RemindClawError, Result};
use remindclaw_core::traits::MessageSender;

use crate::store::{MemoryTaskStore, TaskStore};
use crate::tasks::{NotificationTask, NotificationTaskDraft, TaskId};

/// 2030-01-01 at `hour:min`.
pub fn minute(hour: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2030, 1, 1)
        .unwrap()
        .and_hms_opt(hour, min, 0)
        .unwrap()
}

pub fn draft(chat_id: i64, message: &str, due_at: NaiveDateTime) -> NotificationTaskDraft {
    NotificationTaskDraft {
        chat_id,
        message: message.to_string(),
        due_at,
    }
}

/// Records every send; fails for chats listed in `failing` and never
/// returns for chats listed in `hanging`.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(i64, String)>>,
    failing: HashSet<i64>,
    hanging: HashSet<i64>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(chat_ids: &[i64]) -> Self {
        Self {
            failing: chat_ids.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn hanging_for(chat_ids: &[i64]) -> Self {
        Self {
            hanging: chat_ids.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Attempts, including failed ones.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        if self.hanging.contains(&chat_id) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&chat_id) {
            return Err(RemindClawError::Channel(format!("chat {chat_id} blocked the bot")));
        }
        Ok(())
    }
}

/// Wraps a memory store and fails (or stalls) selected operations on demand.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryTaskStore,
    pub fail_save: AtomicBool,
    pub fail_find: AtomicBool,
    pub fail_claim: AtomicBool,
    pub hang_save: AtomicBool,
    pub hang_find: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    async fn stall(flag: &AtomicBool) {
        if flag.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(RemindClawError::Storage(format!("{op}: database is locked")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn save(&self, draft: NotificationTaskDraft) -> Result<NotificationTask> {
        Self::stall(&self.hang_save).await;
        Self::check(&self.fail_save, "save")?;
        self.inner.save(draft).await
    }

    async fn find_due_at(&self, minute: NaiveDateTime) -> Result<Vec<NotificationTask>> {
        Self::stall(&self.hang_find).await;
        Self::check(&self.fail_find, "find")?;
        self.inner.find_due_at(minute).await
    }

    async fn claim(&self, id: TaskId) -> Result<bool> {
        Self::check(&self.fail_claim, "claim")?;
        self.inner.claim(id).await
    }

    async fn list_pending(&self) -> Result<Vec<NotificationTask>> {
        self.inner.list_pending().await
    }

    async fn record_dead_letter(&self, task: &NotificationTask, reason: &str) -> Result<()> {
        self.inner.record_dead_letter(task, reason).await
    }
}
