//! Seams between the scheduling core and the chat platform.

use async_trait::async_trait;

use crate::error::Result;

/// Outbound capability: deliver `text` to the chat identified by `chat_id`.
///
/// Implementations report platform-side failures as `Err`; callers log them
/// and never retry.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Channel name used in logs.
    fn name(&self) -> &str;

    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}
