//! 消息持久化接口
//!
//! 编排器每轮调用两次 append_message（用户消息、助手回复），无论走直接回复还是工具流水线；
//! recent_messages 为 Planner 提供有界上下文窗口。实现：内存（测试 / 无状态运行）与 SQLite。

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::{ConversationMemory, Message, Role};

/// 消息存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// 持久化协作方：追加消息、读取最近消息
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    /// 最近 limit 条消息，按时间正序
    async fn recent_messages(&self, thread_id: &str, limit: usize)
        -> Result<Vec<Message>, StoreError>;
}

/// 内存消息存储：每个会话一个 ConversationMemory，超出上限自动剪枝
pub struct InMemoryMessageStore {
    threads: RwLock<HashMap<String, ConversationMemory>>,
    max_messages_per_thread: usize,
}

impl InMemoryMessageStore {
    pub fn new(max_messages_per_thread: usize) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            max_messages_per_thread,
        }
    }

    /// 会话全部消息（测试与调试用）
    pub async fn history(&self, thread_id: &str) -> Vec<Message> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .map(|m| m.messages().to_vec())
            .unwrap_or_default()
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new(200)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| ConversationMemory::new(self.max_messages_per_thread))
            .push(Message::new(role, content));
        Ok(())
    }

    async fn recent_messages(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .map(|m| m.recent(limit).to_vec())
            .unwrap_or_default())
    }
}
