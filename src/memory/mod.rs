//! 记忆层：会话消息窗口与消息持久化（内存 / SQLite）

pub mod conversation;
pub mod sqlite;
pub mod store;

pub use conversation::{ConversationMemory, Message, Role};
pub use sqlite::SqliteMessageStore;
pub use store::{InMemoryMessageStore, MessageStore, StoreError};
