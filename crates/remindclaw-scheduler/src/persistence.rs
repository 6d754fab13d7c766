//! SQLite-backed task store — survives restarts.
//!
//! `due_minute` is stored next to `due_at` so the dispatcher's per-minute
//! lookup is a plain indexed equality match. rusqlite is blocking, so every
//! query runs on tokio's blocking pool; callers' timeouts stay effective.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use remindclaw_core::error::{RemindClawError, Result};
use rusqlite::{Connection, params};

use crate::store::TaskStore;
use crate::tasks::{NotificationTask, NotificationTaskDraft, TaskId, truncate_to_minute};

const DUE_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DUE_MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// SQLite-backed persistence store for reminders.
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Open or create the task database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| storage("DB open", e))?;
        Self::with_connection(conn)
    }

    /// Throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| storage("DB open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// How long SQLite waits on a locked database before giving up.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self> {
        self.lock()?
            .busy_timeout(timeout)
            .map_err(|e| storage("Busy timeout", e))?;
        Ok(self)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        lock_conn(&self.conn)
    }

    /// Number of dead-letter rows.
    pub fn dead_letter_count(&self) -> Result<usize> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM notification_dead_letter", [], |row| {
                row.get(0)
            })
            .map_err(|e| storage("Count dead letters", e))?;
        Ok(count as usize)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock_conn(&conn)?;
            f(&guard).map_err(|e| storage(op, e))
        })
        .await
        .map_err(|e| RemindClawError::Storage(format!("{op}: worker failed: {e}")))?
    }
}

/// Run migrations to create tables.
fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Pending reminders; a row is deleted when it is claimed for delivery
        CREATE TABLE IF NOT EXISTS notification_task (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL,
            message TEXT NOT NULL,
            due_at TEXT NOT NULL,            -- YYYY-MM-DD HH:MM:SS, naive local time
            due_minute TEXT NOT NULL         -- YYYY-MM-DD HH:MM, dispatch key
        );
        CREATE INDEX IF NOT EXISTS idx_notification_task_due_minute
            ON notification_task (due_minute);

        -- Reminders whose single delivery attempt failed
        CREATE TABLE IF NOT EXISTS notification_dead_letter (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL,
            message TEXT NOT NULL,
            due_at TEXT NOT NULL,
            reason TEXT NOT NULL,
            failed_at TEXT NOT NULL
        );
     ",
    )
    .map_err(|e| storage("Migration", e))
}

fn lock_conn(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| RemindClawError::Storage("connection mutex poisoned".into()))
}

fn query_tasks(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<NotificationTask>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        let id: i64 = row.get(0)?;
        let chat_id: i64 = row.get(1)?;
        let message: String = row.get(2)?;
        let due_at_str: String = row.get(3)?;
        let due_at = NaiveDateTime::parse_from_str(&due_at_str, DUE_AT_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(NotificationTask {
            id: TaskId(id),
            chat_id,
            message,
            due_at,
        })
    })?;
    rows.collect()
}

fn storage(op: &str, e: rusqlite::Error) -> RemindClawError {
    RemindClawError::Storage(format!("{op}: {e}"))
}

fn minute_key(at: NaiveDateTime) -> String {
    truncate_to_minute(at).format(DUE_MINUTE_FORMAT).to_string()
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, draft: NotificationTaskDraft) -> Result<NotificationTask> {
        let row = draft.clone();
        let id = self
            .run("Save task", move |conn| {
                conn.execute(
                    "INSERT INTO notification_task (chat_id, message, due_at, due_minute)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        row.chat_id,
                        row.message,
                        row.due_at.format(DUE_AT_FORMAT).to_string(),
                        minute_key(row.due_at),
                    ],
                )?;
                Ok(TaskId(conn.last_insert_rowid()))
            })
            .await?;
        tracing::debug!("💾 Saved task {id} for chat {}", draft.chat_id);
        Ok(NotificationTask::from_draft(id, draft))
    }

    async fn find_due_at(&self, minute: NaiveDateTime) -> Result<Vec<NotificationTask>> {
        let key = minute_key(minute);
        self.run("Find due tasks", move |conn| {
            query_tasks(
                conn,
                "SELECT id, chat_id, message, due_at FROM notification_task WHERE due_minute = ?1",
                [key],
            )
        })
        .await
    }

    async fn claim(&self, id: TaskId) -> Result<bool> {
        let removed = self
            .run("Claim task", move |conn| {
                conn.execute("DELETE FROM notification_task WHERE id = ?1", [id.0])
            })
            .await?;
        Ok(removed == 1)
    }

    async fn list_pending(&self) -> Result<Vec<NotificationTask>> {
        self.run("List tasks", |conn| {
            query_tasks(
                conn,
                "SELECT id, chat_id, message, due_at FROM notification_task ORDER BY due_at, id",
                [],
            )
        })
        .await
    }

    async fn record_dead_letter(&self, task: &NotificationTask, reason: &str) -> Result<()> {
        let task = task.clone();
        let reason = reason.to_string();
        let failed_at = chrono::Local::now().naive_local();
        self.run("Record dead letter", move |conn| {
            conn.execute(
                "INSERT INTO notification_dead_letter
                 (task_id, chat_id, message, due_at, reason, failed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    task.id.0,
                    task.chat_id,
                    task.message,
                    task.due_at.format(DUE_AT_FORMAT).to_string(),
                    reason,
                    failed_at.format(DUE_AT_FORMAT).to_string(),
                ],
            )
        })
        .await?;
        Ok(())
    }
}
