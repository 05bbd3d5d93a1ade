//! 聊天历史：消息与角色
//!
//! 助手消息的 content 是含 Artifact 标记的原始回复；版本管理可据此回溯重建历史版本，
//! 自动修复向模型重新提交时也以这些消息为上下文。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息；id 即解析器与版本管理使用的 message id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }

    /// 指定 id（回放或测试时保持稳定）
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// 单个聊天的消息历史
#[derive(Clone, Debug, Default)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// 追加到指定助手消息（流式回复逐段累积）；不存在时新建
    pub fn append_assistant(&mut self, message_id: &str, chunk: &str) {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(m) => m.content.push_str(chunk),
            None => self.messages.push(ChatMessage::assistant(chunk).with_id(message_id)),
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assistant_accumulates() {
        let mut history = ChatHistory::new();
        history.push(ChatMessage::user("build a todo app").with_id("u1"));
        history.append_assistant("a1", "Sure. ");
        history.append_assistant("a1", "<artifact");
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[1].content, "Sure. <artifact");
        assert_eq!(history.messages()[1].role, Role::Assistant);
    }
}
