// Handles SQLite database operations

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(StoreError::InvalidRole(other.to_string())),
        }
    }
}

/// Marks a message as produced by the diagram dialog and by which generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageOrigin {
    Diagram { generator: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: i64,
    pub title: String,
}

/// Represents a chat message entry.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub message: String,
    pub timestamp: String,
    pub origin: Option<MessageOrigin>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// The leading system message, used as grounding for generation.
    pub fn system_message(&self) -> Option<&ChatMessage> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    pub fn message(&self, id: i64) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }
}

/// Assistant message carrying a generated diagram, built on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramMessage {
    pub role: Role,
    pub content: String,
    pub origin: MessageOrigin,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl DiagramMessage {
    pub fn new(content: impl Into<String>, generator: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            origin: MessageOrigin::Diagram {
                generator: generator.into(),
            },
            created_at: chrono::Utc::now(),
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Loads a conversation with its messages in order, or `None` if it does not exist.
    async fn conversation(&self, id: i64) -> StoreResult<Option<Conversation>>;

    async fn append_message(&self, conversation_id: i64, message: DiagramMessage) -> StoreResult<i64>;

    async fn list_conversations(&self) -> StoreResult<Vec<ChatSession>>;
}

#[derive(Clone)]
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Opens the database at `path`, creating the file, its directory and the schema if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        info!(path = %path.display(), "Opening chat database");
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn create_conversation(&self, title: &str, system_prompt: Option<&str>) -> StoreResult<i64> {
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO chat_sessions (title) VALUES (?1)", params![title])?;
        let session_id = conn.last_insert_rowid();

        if let Some(system_prompt) = system_prompt {
            insert_message(&conn, session_id, Role::System, system_prompt, None, None)?;
        }

        debug!(session_id, title, "Created chat session");
        Ok(session_id)
    }

    pub async fn save_chat_message(&self, session_id: i64, role: Role, message: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().await;
        ensure_session(&conn, session_id)?;
        insert_message(&conn, session_id, role, message, None, None)
    }

    pub async fn get_config_value(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().await;
        Ok(get_config_value(&conn, key)?)
    }

    pub async fn update_config_value(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        Ok(update_config_value(&conn, key, value)?)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT
        );
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS chat_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            role TEXT NOT NULL,
            message TEXT NOT NULL,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
            origin TEXT,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
        );",
    )
}

/// Inserts or updates a configuration key-value pair.
pub fn update_config_value(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Retrieves a configuration value by key. Returns `None` if the key doesn't exist.
pub fn get_config_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

fn ensure_session(conn: &Connection, session_id: i64) -> StoreResult<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM chat_sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    match exists {
        Some(_) => Ok(()),
        None => Err(StoreError::ConversationNotFound(session_id)),
    }
}

fn insert_message(
    conn: &Connection,
    session_id: i64,
    role: Role,
    message: &str,
    origin: Option<&MessageOrigin>,
    timestamp: Option<String>,
) -> StoreResult<i64> {
    let origin = origin.map(serde_json::to_string).transpose()?;

    match timestamp {
        Some(timestamp) => conn.execute(
            "INSERT INTO chat_history (session_id, role, message, timestamp, origin) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, role.as_str(), message, timestamp, origin],
        )?,
        None => conn.execute(
            "INSERT INTO chat_history (session_id, role, message, origin) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role.as_str(), message, origin],
        )?,
    };

    Ok(conn.last_insert_rowid())
}

/// Fetches the chat history for a given session.
fn fetch_chat_history(conn: &Connection, session_id: i64) -> StoreResult<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, message, timestamp, origin FROM chat_history WHERE session_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![session_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (id, session_id, role, message, timestamp, origin) = row?;
        messages.push(ChatMessage {
            id,
            session_id,
            role: role.parse()?,
            message,
            timestamp,
            origin: origin
                .as_deref()
                .map(serde_json::from_str::<MessageOrigin>)
                .transpose()?,
        });
    }

    Ok(messages)
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn conversation(&self, id: i64) -> StoreResult<Option<Conversation>> {
        let conn = self.conn.lock().await;

        let title: Option<String> = conn
            .query_row(
                "SELECT title FROM chat_sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(title) = title else {
            return Ok(None);
        };

        Ok(Some(Conversation {
            id,
            title,
            messages: fetch_chat_history(&conn, id)?,
        }))
    }

    async fn append_message(&self, conversation_id: i64, message: DiagramMessage) -> StoreResult<i64> {
        let conn = self.conn.lock().await;
        ensure_session(&conn, conversation_id)?;

        let timestamp = message.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let id = insert_message(
            &conn,
            conversation_id,
            message.role,
            &message.content,
            Some(&message.origin),
            Some(timestamp),
        )?;

        info!(conversation_id, message_id = id, "Inserted diagram message");
        Ok(id)
    }

    async fn list_conversations(&self) -> StoreResult<Vec<ChatSession>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, title FROM chat_sessions ORDER BY id DESC")?;
        let sessions_iter = stmt.query_map([], |row| {
            Ok(ChatSession {
                id: row.get(0)?,
                title: row.get(1)?,
            })
        })?;

        let mut sessions = Vec::new();
        for session in sessions_iter {
            sessions.push(session?);
        }

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conversation_keeps_message_order() {
        let store = SqliteConversationStore::in_memory().unwrap();
        let id = store
            .create_conversation("Planning", Some("You are a planner."))
            .await
            .unwrap();
        store.save_chat_message(id, Role::User, "Plan a trip").await.unwrap();
        store.save_chat_message(id, Role::Assistant, "Day 1: ...").await.unwrap();

        let conversation = store.conversation(id).await.unwrap().unwrap();
        assert_eq!(conversation.title, "Planning");
        let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(
            conversation.system_message().map(|m| m.message.as_str()),
            Some("You are a planner.")
        );
    }

    #[tokio::test]
    async fn missing_conversation_is_none() {
        let store = SqliteConversationStore::in_memory().unwrap();
        assert!(store.conversation(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conversation_without_system_prompt_has_no_system_message() {
        let store = SqliteConversationStore::in_memory().unwrap();
        let id = store.create_conversation("Plain", None).await.unwrap();
        store.save_chat_message(id, Role::User, "hi").await.unwrap();

        let conversation = store.conversation(id).await.unwrap().unwrap();
        assert!(conversation.system_message().is_none());
    }

    #[tokio::test]
    async fn appended_diagram_keeps_origin() {
        let store = SqliteConversationStore::in_memory().unwrap();
        let id = store.create_conversation("Design", Some("sys")).await.unwrap();

        let message_id = store
            .append_message(id, DiagramMessage::new("```\n@startuml\n@enduml\n```", "llama3"))
            .await
            .unwrap();

        let conversation = store.conversation(id).await.unwrap().unwrap();
        let stored = conversation.message(message_id).unwrap();
        assert_eq!(stored.role, Role::Assistant);
        assert_eq!(
            stored.origin,
            Some(MessageOrigin::Diagram {
                generator: "llama3".into()
            })
        );
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_fails() {
        let store = SqliteConversationStore::in_memory().unwrap();
        let err = store
            .append_message(7, DiagramMessage::new("x", "llama3"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConversationNotFound(7)));
    }

    #[tokio::test]
    async fn config_values_round_trip_and_overwrite() {
        let store = SqliteConversationStore::in_memory().unwrap();
        assert_eq!(store.get_config_value("selected_generator").await.unwrap(), None);

        store.update_config_value("selected_generator", "llama3").await.unwrap();
        store.update_config_value("selected_generator", "qwen2").await.unwrap();
        assert_eq!(
            store.get_config_value("selected_generator").await.unwrap().as_deref(),
            Some("qwen2")
        );
    }

    #[tokio::test]
    async fn conversations_are_listed_newest_first() {
        let store = SqliteConversationStore::in_memory().unwrap();
        store.create_conversation("first", None).await.unwrap();
        store.create_conversation("second", None).await.unwrap();

        let titles: Vec<String> = store
            .list_conversations()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(matches!("tool".parse::<Role>(), Err(StoreError::InvalidRole(r)) if r == "tool"));
    }
}
