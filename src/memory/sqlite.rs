//! SQLite 消息存储
//!
//! rusqlite 为同步 API：连接放在 Mutex 里，所有读写经 spawn_blocking 执行，避免阻塞 tokio 工作线程。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::memory::{Message, MessageStore, Role, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id  TEXT NOT NULL,
    role       TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, id);
";

pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMessageStore {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection mutex poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let thread_id = thread_id.to_string();
        let content = content.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (thread_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, role.as_str(), content, Utc::now()],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent_messages(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let thread_id = thread_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content FROM messages WHERE thread_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![thread_id, limit], |row| {
                let role: String = row.get(0)?;
                let content: String = row.get(1)?;
                Ok(Message::new(Role::parse(&role), content))
            })?;
            let mut messages = rows.collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_read_back_in_order() {
        let store = SqliteMessageStore::in_memory().unwrap();
        store.append_message("t1", Role::User, "first").await.unwrap();
        store
            .append_message("t1", Role::Assistant, "second")
            .await
            .unwrap();
        store.append_message("t1", Role::User, "third").await.unwrap();
        store.append_message("t2", Role::User, "elsewhere").await.unwrap();

        let recent = store.recent_messages("t1", 2).await.unwrap();
        assert_eq!(
            recent,
            vec![Message::assistant("second"), Message::user("third")]
        );
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("steward.db");
        {
            let store = SqliteMessageStore::open(&path).unwrap();
            store.append_message("t", Role::User, "hello").await.unwrap();
        }
        let store = SqliteMessageStore::open(&path).unwrap();
        let recent = store.recent_messages("t", 10).await.unwrap();
        assert_eq!(recent, vec![Message::user("hello")]);
    }
}
