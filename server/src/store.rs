use std::{
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS content (
    name TEXT NOT NULL UNIQUE,
    parent_dir TEXT NOT NULL,
    file_body TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS content_parent_dir ON content (parent_dir);
CREATE TABLE IF NOT EXISTS command_log (
    raw TEXT NOT NULL,
    is_command INTEGER NOT NULL,
    client_ip TEXT NOT NULL,
    user_agent TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);
";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_dir: String,
    #[serde(default)]
    pub file_body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLogEntry {
    pub raw: String,
    pub is_command: bool,
    pub client_ip: String,
    pub user_agent: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0}")]
    Invalid(String),
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("store connection poisoned")]
    Poisoned,
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Persistence behind the terminal and the REST surface. Implementations are
/// shared by every session, so they must tolerate concurrent callers.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn content_by_name(&self, name: &str) -> Result<Content, StoreError>;

    async fn add_content(&self, content: Content) -> Result<Content, StoreError>;

    /// Names of every entry whose parent directory is `dir`, oldest first.
    async fn names_in_dir(&self, dir: &str) -> Result<Vec<String>, StoreError>;

    /// `Ok(None)` when no entry carries `name`.
    async fn file_content(&self, name: &str) -> Result<Option<String>, StoreError>;

    async fn save_command(&self, entry: CommandLogEntry) -> Result<(), StoreError>;
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await?
    }
}

#[async_trait]
impl Datastore for SqliteStore {
    async fn content_by_name(&self, name: &str) -> Result<Content, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT name, parent_dir, file_body FROM content WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Content {
                        name: row.get(0)?,
                        parent_dir: row.get(1)?,
                        file_body: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound(name))
        })
        .await
    }

    async fn add_content(&self, content: Content) -> Result<Content, StoreError> {
        if content.name.trim().is_empty() {
            return Err(StoreError::Invalid("content name is required".to_string()));
        }
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO content (name, parent_dir, file_body, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
                params![content.name, content.parent_dir, content.file_body, now_ms() as i64],
            );
            match inserted {
                Ok(_) => Ok(content),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Err(StoreError::Invalid(format!("content '{}' already exists", content.name)))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn names_in_dir(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let dir = dir.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM content WHERE parent_dir = ?1 ORDER BY rowid")?;
            let names = stmt
                .query_map(params![dir], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn file_content(&self, name: &str) -> Result<Option<String>, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT file_body FROM content WHERE name = ?1",
                    params![name],
                    |row| row.get::<_, String>(0),
                )
                .optional()?)
        })
        .await
    }

    async fn save_command(&self, entry: CommandLogEntry) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO command_log (raw, is_command, client_ip, user_agent, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.raw,
                    entry.is_command,
                    entry.client_ip,
                    entry.user_agent,
                    now_ms() as i64
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
impl SqliteStore {
    pub(crate) fn in_memory() -> Self {
        Self::open(":memory:").expect("open in-memory store")
    }

    pub(crate) async fn command_log(&self) -> Vec<CommandLogEntry> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT raw, is_command, client_ip, user_agent FROM command_log ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CommandLogEntry {
                        raw: row.get(0)?,
                        is_command: row.get(1)?,
                        client_ip: row.get(2)?,
                        user_agent: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .expect("read command log")
    }
}

#[cfg(test)]
pub(crate) fn content(name: &str, parent_dir: &str, file_body: &str) -> Content {
    Content {
        name: name.to_string(),
        parent_dir: parent_dir.to_string(),
        file_body: file_body.to_string(),
    }
}
