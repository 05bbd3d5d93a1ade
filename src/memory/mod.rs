//! 记忆层：聊天历史与 JSON 持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{ChatHistory, ChatMessage, Role};
pub use persistence::{ChatHistoryPersistence, JsonFileStore};
