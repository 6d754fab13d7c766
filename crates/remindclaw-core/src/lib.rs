//! # RemindClaw Core
//! Shared configuration, error type, message types and the outbound
//! sender trait used by every other RemindClaw crate.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RemindClawConfig;
pub use error::{RemindClawError, Result};
pub use traits::MessageSender;
pub use types::InboundUpdate;
