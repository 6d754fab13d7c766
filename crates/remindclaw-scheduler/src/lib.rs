//! # RemindClaw Scheduler
//!
//! The notification lifecycle: parse a chat message into a reminder, keep it
//! pending in a store, fire it at its minute.
//!
//! ## Architecture
//! ```text
//! Telegram batch ──► UpdateRouter ──► parser::parse
//!                        │                 ├── Greeting        → welcome reply
//!                        │                 ├── ScheduleRequest → save + "Task planned!"
//!                        │                 └── Rejected        → "wrong message format!"
//!                        ▼
//!                    TaskStore (sqlite | memory)
//!                        ▲
//! minute boundary ──► Dispatcher::tick
//!                        ├── find_due_at(now truncated to minute)
//!                        ├── claim(id)   (compare-and-delete)
//!                        └── MessageSender::send(chat_id, message)
//! ```

pub mod dispatch;
pub mod engine;
pub mod parser;
pub mod persistence;
pub mod router;
pub mod store;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{Clock, Dispatcher, SystemClock, TickReport};
pub use engine::{spawn_dispatcher, spawn_router};
pub use parser::{Intent, ParseRejection, parse, parse_with};
pub use persistence::SqliteTaskStore;
pub use router::{DispatchOutcome, UpdateRouter};
pub use store::{MemoryTaskStore, TaskStore};
pub use tasks::{DeadLetter, NotificationTask, NotificationTaskDraft, TaskId, truncate_to_minute};
