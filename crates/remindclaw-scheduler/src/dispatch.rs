//! Due-task dispatcher — fires the reminders of the current minute.
//!
//! Per task: `Pending → claimed (row deleted) → send attempted`. Claiming
//! before sending makes delivery at-most-once even if two dispatchers tick
//! the same minute. A failed send is logged and not retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use remindclaw_core::config::{DeliveryPolicy, SchedulerConfig};
use remindclaw_core::error::{RemindClawError, Result};
use remindclaw_core::traits::MessageSender;

use crate::store::TaskStore;
use crate::tasks::{NotificationTask, truncate_to_minute};

/// Source of "now" for the dispatcher. Naive local time: there is one
/// implicit clock and no timezone handling.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in local time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks returned by the due-minute lookup.
    pub due: usize,
    pub delivered: usize,
    /// Claimed but the send failed.
    pub failed: usize,
    /// Already claimed elsewhere, or the claim itself failed.
    pub skipped: usize,
}

/// Finds, claims and sends due reminders.
pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    sender: Arc<dyn MessageSender>,
    clock: Arc<dyn Clock>,
    policy: DeliveryPolicy,
    send_timeout: Duration,
    store_timeout: Duration,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn TaskStore>, sender: Arc<dyn MessageSender>) -> Self {
        Self::with_config(store, sender, &SchedulerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn TaskStore>,
        sender: Arc<dyn MessageSender>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sender,
            clock: Arc::new(SystemClock),
            policy: config.delivery_policy,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            store_timeout: Duration::from_secs(config.store_timeout_secs),
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Tick for the clock's current minute.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(self.clock.now()).await
    }

    /// Tick for the minute containing `now`.
    pub async fn tick_at(&self, now: NaiveDateTime) -> TickReport {
        let minute = truncate_to_minute(now);
        let mut report = TickReport::default();

        let lookup = self.store.find_due_at(minute);
        let due = match bounded(self.store_timeout, "find due tasks", lookup).await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Due-task lookup for {minute} failed on {}: {e}",
                    self.store.name()
                );
                return report;
            }
        };
        report.due = due.len();
        if due.is_empty() {
            return report;
        }
        tracing::info!("🔔 {} task(s) due at {minute}", due.len());

        for task in due {
            match bounded(self.store_timeout, "claim task", self.store.claim(task.id)).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Task {} already claimed, skipping", task.id);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Could not claim task {}: {e}", task.id);
                    report.skipped += 1;
                    continue;
                }
            }

            match self.deliver(&task).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    self.on_failed_delivery(&task, &e).await;
                }
            }
        }

        tracing::info!(
            "📣 Tick {minute}: {} delivered, {} failed, {} skipped",
            report.delivered,
            report.failed,
            report.skipped
        );
        report
    }

    async fn deliver(&self, task: &NotificationTask) -> Result<()> {
        bounded(
            self.send_timeout,
            "send notification",
            self.sender.send(task.chat_id, &task.message),
        )
        .await?;
        tracing::info!("✅ Task {} delivered to chat {}", task.id, task.chat_id);
        Ok(())
    }

    async fn on_failed_delivery(&self, task: &NotificationTask, error: &RemindClawError) {
        tracing::warn!(
            "Message was not sent: task {} to chat {}, error: {error}",
            task.id,
            task.chat_id
        );
        if self.policy == DeliveryPolicy::DeadLetter {
            let reason = error.to_string();
            if let Err(e) = bounded(
                self.store_timeout,
                "record dead letter",
                self.store.record_dead_letter(task, &reason),
            )
            .await
            {
                tracing::warn!("⚠️ Failed to dead-letter task {}: {e}", task.id);
            }
        }
    }
}

/// Run `fut` with an upper bound so one stuck call cannot stall the tick.
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RemindClawError::Timeout(format!("{what} after {limit:?}"))),
    }
}

/// Time left until the next minute boundary (second 0). Exactly on a
/// boundary this is a full minute: the current minute is already running.
pub fn until_next_minute(now: NaiveDateTime) -> Duration {
    let next = truncate_to_minute(now) + chrono::Duration::minutes(1);
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTaskStore;
    use crate::testing::{FlakyStore, RecordingSender, draft, minute};
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    #[tokio::test]
    async fn test_delivers_and_removes_due_task() {
        let store = Arc::new(MemoryTaskStore::new());
        let sender = Arc::new(RecordingSender::new());
        store.save(draft(10, "!!!", minute(9, 0))).await.unwrap();

        let dispatcher = Dispatcher::new(store.clone(), sender.clone());
        let report = dispatcher.tick_at(minute(9, 0)).await;

        assert_eq!(
            report,
            TickReport {
                due: 1,
                delivered: 1,
                failed: 0,
                skipped: 0,
            }
        );
        assert_eq!(sender.sent(), vec![(10, "!!!".to_string())]);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_other_minutes_do_nothing() {
        let store = Arc::new(MemoryTaskStore::new());
        let sender = Arc::new(RecordingSender::new());
        store.save(draft(10, "!!!", minute(9, 0))).await.unwrap();
        let dispatcher = Dispatcher::new(store.clone(), sender.clone());

        assert_eq!(dispatcher.tick_at(minute(8, 59)).await.due, 0);
        // A missed minute is never delivered late.
        assert_eq!(dispatcher.tick_at(minute(9, 1)).await.due, 0);
        assert!(sender.sent().is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_seconds_of_now_are_ignored() {
        let store = Arc::new(MemoryTaskStore::new());
        let sender = Arc::new(RecordingSender::new());
        store.save(draft(10, "!", minute(9, 0))).await.unwrap();
        let dispatcher = Dispatcher::new(store.clone(), sender.clone())
            .with_clock(Arc::new(FixedClock(minute(9, 0) + chrono::Duration::seconds(2))));

        assert_eq!(dispatcher.tick().await.delivered, 1);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_block_others() {
        let store = Arc::new(MemoryTaskStore::new());
        let sender = Arc::new(RecordingSender::failing_for(&[1]));
        store.save(draft(1, "!", minute(12, 0))).await.unwrap();
        store.save(draft(2, "?", minute(12, 0))).await.unwrap();

        let report = Dispatcher::new(store.clone(), sender.clone()).tick_at(minute(12, 0)).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(sender.sent_to(1), vec!["!".to_string()]);
        assert_eq!(sender.sent_to(2), vec!["?".to_string()]);
        // Failed task is not kept for a retry.
        assert!(store.is_empty().await);
        assert!(store.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn test_dead_letter_policy_records_failures() {
        let store = Arc::new(MemoryTaskStore::new());
        let sender = Arc::new(RecordingSender::failing_for(&[1]));
        store.save(draft(1, "!", minute(12, 0))).await.unwrap();
        let config = SchedulerConfig {
            delivery_policy: DeliveryPolicy::DeadLetter,
            ..SchedulerConfig::default()
        };

        Dispatcher::with_config(store.clone(), sender, &config)
            .tick_at(minute(12, 0))
            .await;

        let dead = store.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].task.chat_id, 1);
        assert!(dead[0].reason.contains("blocked"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_second_tick_same_minute_sends_nothing() {
        let store = Arc::new(MemoryTaskStore::new());
        let sender = Arc::new(RecordingSender::new());
        store.save(draft(10, "!", minute(9, 0))).await.unwrap();
        let dispatcher = Dispatcher::new(store.clone(), sender.clone());

        dispatcher.tick_at(minute(9, 0)).await;
        dispatcher.tick_at(minute(9, 0)).await;
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_dispatchers_deliver_once() {
        let store = Arc::new(MemoryTaskStore::new());
        let sender = Arc::new(RecordingSender::new());
        for chat in 0..20 {
            store.save(draft(chat, "!", minute(9, 0))).await.unwrap();
        }
        let a = Dispatcher::new(store.clone(), sender.clone());
        let b = Dispatcher::new(store.clone(), sender.clone());

        let (ra, rb) = tokio::join!(a.tick_at(minute(9, 0)), b.tick_at(minute(9, 0)));

        assert_eq!(ra.delivered + rb.delivered, 20);
        assert_eq!(sender.sent().len(), 20);
    }

    #[tokio::test]
    async fn test_lookup_failure_leaves_tasks_pending() {
        let store = Arc::new(FlakyStore::new());
        let sender = Arc::new(RecordingSender::new());
        store.save(draft(10, "!", minute(9, 0))).await.unwrap();
        store.fail_find.store(true, Ordering::SeqCst);

        let report = Dispatcher::new(store.clone(), sender.clone()).tick_at(minute(9, 0)).await;

        assert_eq!(report, TickReport::default());
        assert!(sender.sent().is_empty());
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_claim_failure_skips_without_sending() {
        let store = Arc::new(FlakyStore::new());
        let sender = Arc::new(RecordingSender::new());
        store.save(draft(10, "!", minute(9, 0))).await.unwrap();
        store.fail_claim.store(true, Ordering::SeqCst);

        let report = Dispatcher::new(store.clone(), sender.clone()).tick_at(minute(9, 0)).await;

        assert_eq!(report.skipped, 1);
        assert!(sender.sent().is_empty());
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_hanging_send_is_cut_off() {
        let store = Arc::new(MemoryTaskStore::new());
        let sender = Arc::new(RecordingSender::hanging_for(&[1]));
        store.save(draft(1, "!", minute(12, 0))).await.unwrap();
        store.save(draft(2, "?", minute(12, 0))).await.unwrap();
        let config = SchedulerConfig {
            send_timeout_secs: 1,
            ..SchedulerConfig::default()
        };

        let started = Instant::now();
        let report = Dispatcher::with_config(store.clone(), sender.clone(), &config)
            .tick_at(minute(12, 0))
            .await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(sender.sent_to(2), vec!["?".to_string()]);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_hanging_lookup_ends_tick() {
        let store = Arc::new(FlakyStore::new());
        let sender = Arc::new(RecordingSender::new());
        store.save(draft(10, "!", minute(9, 0))).await.unwrap();
        store.hang_find.store(true, Ordering::SeqCst);
        let config = SchedulerConfig {
            store_timeout_secs: 1,
            ..SchedulerConfig::default()
        };

        let started = Instant::now();
        let report = Dispatcher::with_config(store.clone(), sender.clone(), &config)
            .tick_at(minute(9, 0))
            .await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(report, TickReport::default());
        assert!(sender.sent().is_empty());
        assert_eq!(store.inner.len().await, 1);
    }

    #[test]
    fn test_until_next_minute() {
        let now = minute(9, 0) + chrono::Duration::seconds(45);
        assert_eq!(until_next_minute(now), Duration::from_secs(15));
        assert_eq!(until_next_minute(minute(9, 0)), Duration::from_secs(60));
        let almost = minute(9, 0) + chrono::Duration::milliseconds(59_999);
        assert_eq!(until_next_minute(almost), Duration::from_millis(1));
    }
}
