//! # RemindClaw — Telegram reminder bot
//!
//! Send the bot `dd.MM.yyyy HH:mm <message>` and it sends `<message>` back to
//! the same chat at that minute.
//!
//! Usage:
//!   remindclaw                          # Run the bot (same as `serve`)
//!   remindclaw --config bot.toml serve  # Custom config file
//!   remindclaw pending                  # List reminders waiting to fire
//!   remindclaw init                     # Write a default config file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remindclaw_channels::TelegramChannel;
use remindclaw_core::config::{RemindClawConfig, StorageBackend};
use remindclaw_scheduler::{
    Dispatcher, MemoryTaskStore, SqliteTaskStore, TaskStore, UpdateRouter, spawn_dispatcher,
    spawn_router,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remindclaw", version, about = "⏰ RemindClaw — Telegram reminder bot")]
struct Cli {
    /// Config file (default: ~/.remindclaw/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: route incoming messages and fire due reminders
    Serve,
    /// List pending reminders
    Pending,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "remindclaw=debug,remindclaw_scheduler=debug,remindclaw_channels=debug"
    } else {
        "remindclaw=info,remindclaw_scheduler=info,remindclaw_channels=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(RemindClawConfig::default_path);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Init { force } => init(&config_path, force),
        Commands::Pending => {
            let config = load_config(&config_path)?;
            pending(&config).await
        }
        Commands::Serve => {
            let config = load_config(&config_path)?;
            serve(config).await
        }
    }
}

fn load_config(path: &std::path::Path) -> Result<RemindClawConfig> {
    let config = if path.exists() {
        RemindClawConfig::load_from(path)?
    } else {
        tracing::warn!("No config at {}, using defaults", path.display());
        RemindClawConfig::default()
    };
    Ok(config.with_env_overrides())
}

fn init(path: &std::path::Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("⚠️  {} already exists (use --force to overwrite)", path.display());
        return Ok(());
    }
    RemindClawConfig::default().save_to(path)?;
    println!("✅ Config written to {}", path.display());
    println!(
        "   Set telegram.bot_token there or export {}",
        remindclaw_core::config::ENV_BOT_TOKEN
    );
    Ok(())
}

fn open_store(config: &RemindClawConfig) -> Result<Arc<dyn TaskStore>> {
    let store: Arc<dyn TaskStore> = match config.storage.backend {
        StorageBackend::Sqlite => {
            let path = config.storage.resolved_db_path();
            tracing::info!("💾 Task store: {}", path.display());
            let busy = Duration::from_secs(config.scheduler.store_timeout_secs);
            Arc::new(
                SqliteTaskStore::open(&path)
                    .and_then(|store| store.with_busy_timeout(busy))
                    .with_context(|| format!("opening task database {}", path.display()))?,
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("⚠️ In-memory task store: reminders are lost on restart");
            Arc::new(MemoryTaskStore::new())
        }
    };
    Ok(store)
}

async fn pending(config: &RemindClawConfig) -> Result<()> {
    let store = open_store(config)?;
    let tasks = store.list_pending().await?;
    if tasks.is_empty() {
        println!("No pending reminders.");
        return Ok(());
    }
    println!("{:<8} {:<16} {:<14} MESSAGE", "ID", "DUE", "CHAT");
    for task in tasks {
        println!(
            "{:<8} {:<16} {:<14} {}",
            task.id.0,
            task.due_at.format("%d.%m.%Y %H:%M"),
            task.chat_id,
            task.message
        );
    }
    Ok(())
}

async fn serve(config: RemindClawConfig) -> Result<()> {
    config.validate()?;
    println!("⏰ RemindClaw v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config)?;
    let telegram = TelegramChannel::new(config.telegram.clone());
    telegram
        .connect()
        .await
        .context("Telegram bot registration failed")?;
    let sender = Arc::new(telegram.clone());

    // The router is the one and only consumer of the update stream.
    let router = Arc::new(UpdateRouter::with_config(
        store.clone(),
        sender.clone(),
        &config.scheduler,
    ));
    let router_task = spawn_router(router, telegram.start_polling());

    let dispatcher = Arc::new(Dispatcher::with_config(store, sender, &config.scheduler));
    let dispatcher_task = spawn_dispatcher(dispatcher);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
        result = router_task => {
            tracing::error!("Update router stopped: {result:?}");
        }
        result = dispatcher_task => {
            tracing::error!("Dispatcher stopped: {result:?}");
        }
    }
    Ok(())
}
