//! Update router — turns inbound chat updates into stored reminders and
//! replies to the sender right away.
//!
//! Every recognised or rejected text gets a reply; updates without text are
//! ignored silently.

use std::sync::Arc;
use std::time::Duration;

use remindclaw_core::config::{MessageGrammar, SchedulerConfig};
use remindclaw_core::error::RemindClawError;
use remindclaw_core::traits::MessageSender;
use remindclaw_core::types::{BatchAck, InboundUpdate};

use crate::dispatch::bounded;
use crate::parser::{self, Intent, ParseRejection};
use crate::store::TaskStore;
use crate::tasks::{NotificationTask, NotificationTaskDraft};

pub const WELCOME_MESSAGE: &str = "Welcome to AKL telegram chat bot!";
pub const TASK_PLANNED_MESSAGE: &str = "Task planned!";
pub const WRONG_FORMAT_MESSAGE: &str = "wrong message format!";
pub const SAVE_FAILED_MESSAGE: &str = "Failed to plan the task, please try again later.";

/// Result of routing one update.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No text in the update; nothing was done.
    Ignored,
    WelcomeSent,
    TaskScheduled(NotificationTask),
    Rejected(ParseRejection),
    /// The reminder was valid but the store refused it.
    SaveFailed(RemindClawError),
}

/// Sole consumer of the inbound update stream.
pub struct UpdateRouter {
    store: Arc<dyn TaskStore>,
    sender: Arc<dyn MessageSender>,
    grammar: MessageGrammar,
    store_timeout: Duration,
}

impl UpdateRouter {
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
            grammar: config.message_grammar,
            store_timeout: Duration::from_secs(config.store_timeout_secs),
        }
    }

    /// Select the message grammar used by the parser.
    pub fn with_grammar(mut self, grammar: MessageGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Process a whole batch. Updates are independent: a failure on one never
    /// stops the rest, and the batch is always confirmed.
    pub async fn handle_batch(&self, updates: Vec<InboundUpdate>) -> BatchAck {
        tracing::debug!("Processing batch of {} update(s)", updates.len());
        for update in &updates {
            let outcome = self.handle_update(update).await;
            tracing::debug!("Update {} → {:?}", update.update_id, outcome);
        }
        BatchAck::ConfirmedAll
    }

    /// Route a single update.
    pub async fn handle_update(&self, update: &InboundUpdate) -> DispatchOutcome {
        let Some(text) = update.text.as_deref() else {
            return DispatchOutcome::Ignored;
        };
        let chat_id = update.chat_id;
        tracing::info!("Processing update {} from chat {chat_id}", update.update_id);

        match parser::parse_with(text, self.grammar) {
            Intent::Greeting => {
                self.reply(chat_id, WELCOME_MESSAGE).await;
                DispatchOutcome::WelcomeSent
            }
            Intent::ScheduleRequest { due_at, message } => {
                let draft = NotificationTaskDraft {
                    chat_id,
                    message,
                    due_at,
                };
                match bounded(self.store_timeout, "save task", self.store.save(draft)).await {
                    Ok(task) => {
                        tracing::info!(
                            "📅 Task {} planned for chat {chat_id} at {}",
                            task.id,
                            task.due_at
                        );
                        self.reply(chat_id, TASK_PLANNED_MESSAGE).await;
                        DispatchOutcome::TaskScheduled(task)
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Failed to save task for chat {chat_id}: {e}");
                        self.reply(chat_id, SAVE_FAILED_MESSAGE).await;
                        DispatchOutcome::SaveFailed(e)
                    }
                }
            }
            Intent::Rejected(reason) => {
                tracing::debug!("Rejected text from chat {chat_id}: {reason}");
                self.reply(chat_id, WRONG_FORMAT_MESSAGE).await;
                DispatchOutcome::Rejected(reason)
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.sender.send(chat_id, text).await {
            tracing::warn!(
                "Message was not sent to chat {chat_id} via {}: {e}",
                self.sender.name()
            );
        }
    }
}
