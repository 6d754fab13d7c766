//! RemindClaw configuration system.
//!
//! Loaded from `~/.remindclaw/config.toml`; every field has a default so an
//! empty file (or no file) is a valid configuration. A handful of values can
//! be overridden from the environment for container deployments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RemindClawError, Result};

/// Env var that overrides `telegram.bot_token`.
pub const ENV_BOT_TOKEN: &str = "REMINDCLAW_TELEGRAM_BOT_TOKEN";
/// Env var that overrides `storage.db_path`.
pub const ENV_DB_PATH: &str = "REMINDCLAW_DB_PATH";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindClawConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl RemindClawConfig {
    /// Load config from the default path (~/.remindclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RemindClawError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RemindClawError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply environment overrides on top of file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(ENV_BOT_TOKEN)
            && !token.is_empty()
        {
            self.telegram.bot_token = token;
        }
        if let Ok(path) = std::env::var(ENV_DB_PATH)
            && !path.is_empty()
        {
            self.storage.db_path = path;
        }
        self
    }

    /// Save config to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RemindClawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that have no usable default.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(RemindClawError::Config(format!(
                "telegram.bot_token is empty (set it in the config file or {ENV_BOT_TOKEN})"
            )));
        }
        if self.scheduler.send_timeout_secs == 0 || self.scheduler.store_timeout_secs == 0 {
            return Err(RemindClawError::Config(
                "scheduler timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the RemindClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".remindclaw")
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Long-polling timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Pause between two `getUpdates` calls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_api_base() -> String { "https://api.telegram.org".into() }
fn default_poll_timeout() -> u64 { 30 }
fn default_poll_interval() -> u64 { 1 }

impl Default for TelegramChannelConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// What happens to a task whose delivery failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Claim, send once, forget. A failed send is only logged.
    #[default]
    AtMostOnce,
    /// Like `AtMostOnce`, but failed sends are kept in a dead-letter table.
    DeadLetter,
}

/// Which messages the reminder grammar accepts after the date field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageGrammar {
    /// Only non-word characters (no ASCII letters, digits or `_`).
    #[default]
    Strict,
    /// Any non-empty text.
    Relaxed,
}

/// Dispatcher and parser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub delivery_policy: DeliveryPolicy,
    #[serde(default)]
    pub message_grammar: MessageGrammar,
    /// Upper bound for one outbound send.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    /// Upper bound for one store call.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

fn default_send_timeout() -> u64 { 10 }
fn default_store_timeout() -> u64 { 5 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delivery_policy: DeliveryPolicy::default(),
            message_grammar: MessageGrammar::default(),
            send_timeout_secs: default_send_timeout(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

/// Task store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    /// Process-local, lost on restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.remindclaw/tasks.db".into() }

impl StorageConfig {
    /// `db_path` with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            db_path: default_db_path(),
        }
    }
}
