//! Platform-neutral message types.

use serde::{Deserialize, Serialize};

/// One inbound chat event. `text` is `None` for stickers, photos, joins and
/// other non-text updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub chat_id: i64,
    pub text: Option<String>,
}

impl InboundUpdate {
    pub fn text(update_id: i64, chat_id: i64, text: &str) -> Self {
        Self {
            update_id,
            chat_id,
            text: Some(text.to_string()),
        }
    }
}

/// Acknowledgement returned to the transport after a batch is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAck {
    /// Every update of the batch counts as processed; the transport must
    /// advance its offset past the whole batch.
    ConfirmedAll,
}
