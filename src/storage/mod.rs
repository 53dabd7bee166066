use crate::config::Config;
use crate::conversation::{Conversation, Message};
use crate::error::{ChatRelayError, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

pub mod types;
pub use types::{StoredSession, UsageSummary};

/// Environment variable that points at an alternate history database
pub const HISTORY_DB_ENV_VAR: &str = "CHATRELAY_HISTORY_DB";

/// Shortest id prefix accepted in place of a full session id
pub const MIN_PREFIX_LEN: usize = 8;

/// Storage backend for conversation history
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Open the history database chosen by environment and configuration
    ///
    /// Order: `CHATRELAY_HISTORY_DB`, then `storage.history_db`, then
    /// `history.db` in the platform data directory.
    pub fn open(config: &Config) -> Result<Self> {
        if let Ok(override_path) = std::env::var(HISTORY_DB_ENV_VAR) {
            return Self::new_with_path(override_path);
        }

        if let Some(path) = &config.storage.history_db {
            return Self::new_with_path(path.clone());
        }

        let proj_dirs = ProjectDirs::from("com", "chatrelay", "chatrelay")
            .ok_or_else(|| ChatRelayError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("history.db"))
    }

    /// Create a storage instance that uses the specified database path
    ///
    /// The parent directory is created when missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("history.db")).unwrap();
    /// assert!(storage.list_conversations(None).unwrap().is_empty());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create parent directory for database")
                    .map_err(|e| ChatRelayError::Storage(e.to_string()))?;
            }
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| ChatRelayError::Storage(e.to_string()).into())
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                total_messages INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                messages JSON NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations (user_id)",
            [],
        )
        .context("Failed to create index")
        .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Save or update a conversation
    ///
    /// An existing row keeps its original `created_at`.
    pub fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conn = self.connect()?;

        let messages_json = serde_json::to_string(&conversation.messages)
            .context("Failed to serialize messages")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?",
                params![conversation.session_id],
                |_| Ok(()),
            )
            .optional()
            .context("Failed to look up conversation")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?
            .is_some();

        let updated_at = conversation.updated_at.to_rfc3339();

        if exists {
            tx.execute(
                "UPDATE conversations SET
                    user_id = ?,
                    title = ?,
                    updated_at = ?,
                    total_messages = ?,
                    total_tokens = ?,
                    messages = ?
                WHERE id = ?",
                params![
                    conversation.user_id,
                    conversation.title,
                    updated_at,
                    conversation.total_messages as i64,
                    conversation.total_tokens as i64,
                    messages_json,
                    conversation.session_id
                ],
            )
            .context("Failed to update conversation")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;
        } else {
            tx.execute(
                "INSERT INTO conversations
                    (id, user_id, title, created_at, updated_at, total_messages, total_tokens, messages)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    conversation.session_id,
                    conversation.user_id,
                    conversation.title,
                    conversation.created_at.to_rfc3339(),
                    updated_at,
                    conversation.total_messages as i64,
                    conversation.total_tokens as i64,
                    messages_json
                ],
            )
            .context("Failed to insert conversation")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        tracing::debug!(
            "Saved conversation {} ({} messages)",
            conversation.session_id,
            conversation.total_messages
        );

        Ok(())
    }

    /// Load a conversation by ID (supports full UUID or 8-char prefix)
    ///
    /// # Errors
    ///
    /// Returns `Storage` when a prefix matches more than one session
    pub fn load_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.connect()?;
        let Some(id) = resolve_id(&conn, id)? else {
            return Ok(None);
        };

        let row = conn
            .query_row(
                "SELECT id, user_id, title, created_at, updated_at, total_tokens, messages
                FROM conversations WHERE id = ?",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query conversation")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        let Some((session_id, user_id, title, created_at, updated_at, total_tokens, messages_json)) =
            row
        else {
            return Ok(None);
        };

        let messages: Vec<Message> = serde_json::from_str(&messages_json)
            .context("Failed to deserialize messages")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        Ok(Some(Conversation {
            session_id,
            user_id,
            title,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
            total_messages: messages.len(),
            total_tokens: total_tokens.max(0) as u64,
            messages,
        }))
    }

    /// List stored sessions, newest first, optionally for one user
    pub fn list_conversations(&self, user_id: Option<&str>) -> Result<Vec<StoredSession>> {
        let conn = self.connect()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, title, created_at, updated_at, total_messages, total_tokens
                FROM conversations
                WHERE ?1 IS NULL OR user_id = ?1
                ORDER BY updated_at DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        let sessions = stmt
            .query_map(params![user_id], |row| {
                let created_at: String = row.get(3)?;
                let updated_at: String = row.get(4)?;
                let total_messages: i64 = row.get(5)?;
                let total_tokens: i64 = row.get(6)?;

                Ok(StoredSession {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: parse_timestamp(&created_at),
                    updated_at: parse_timestamp(&updated_at),
                    total_messages: total_messages.max(0) as usize,
                    total_tokens: total_tokens.max(0) as u64,
                })
            })
            .context("Failed to query sessions")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read session row")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        Ok(sessions)
    }

    /// Delete a conversation (supports full UUID or 8-char prefix)
    ///
    /// Deleting a missing conversation is not an error. Returns the number
    /// of rows removed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` when a prefix matches more than one session
    pub fn delete_conversation(&self, id: &str) -> Result<usize> {
        let conn = self.connect()?;
        let Some(id) = resolve_id(&conn, id)? else {
            return Ok(0);
        };

        let removed = conn
            .execute("DELETE FROM conversations WHERE id = ?", params![id])
            .context("Failed to delete conversation")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        Ok(removed)
    }

    /// Totals across every conversation owned by `user_id`
    pub fn usage_for_user(&self, user_id: &str) -> Result<UsageSummary> {
        let conn = self.connect()?;

        let (conversations, total_messages, total_tokens) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(total_messages), 0), COALESCE(SUM(total_tokens), 0)
                FROM conversations WHERE user_id = ?",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .context("Failed to aggregate usage")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        Ok(UsageSummary {
            user_id: user_id.to_string(),
            conversations: conversations.max(0) as usize,
            total_messages: total_messages.max(0) as usize,
            total_tokens: total_tokens.max(0) as u64,
        })
    }
}

/// Map a full id or a unique prefix to the stored session id
///
/// An exact match always wins. Otherwise the input must be at least
/// `MIN_PREFIX_LEN` characters and match exactly one session.
fn resolve_id(conn: &Connection, id: &str) -> Result<Option<String>> {
    let id = id.trim();
    if id.is_empty() {
        return Ok(None);
    }

    let exact: Option<String> = conn
        .query_row(
            "SELECT id FROM conversations WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to look up conversation")
        .map_err(|e| ChatRelayError::Storage(e.to_string()))?;
    if exact.is_some() || id.chars().count() < MIN_PREFIX_LEN {
        return Ok(exact);
    }

    let mut stmt = conn
        .prepare("SELECT id FROM conversations WHERE id LIKE ? ESCAPE '\\' LIMIT 2")
        .context("Failed to prepare statement")
        .map_err(|e| ChatRelayError::Storage(e.to_string()))?;
    let matches = stmt
        .query_map(params![format!("{}%", escape_like(id))], |row| {
            row.get::<_, String>(0)
        })
        .context("Failed to look up conversation")
        .map_err(|e| ChatRelayError::Storage(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to read session id")
        .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.into_iter().next()),
        _ => Err(ChatRelayError::Storage(format!(
            "ambiguous id '{}' matches more than one conversation",
            id
        ))
        .into()),
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
