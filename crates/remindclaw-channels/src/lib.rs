//! # RemindClaw Channels
//! Chat platform implementations of the inbound update stream and the
//! outbound `MessageSender`.

pub mod telegram;

pub use telegram::{TelegramChannel, TelegramPollingStream};
