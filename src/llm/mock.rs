//! 脚本化模型客户端（用于测试与回放，无需 API）
//!
//! 按顺序返回预置回复，每条回复切成固定大小的 chunk 模拟流式输出；记录收到的最后一条用户消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::core::ModelError;
use crate::llm::{ModelClient, TokenStream};
use crate::memory::{ChatMessage, Role};

/// 脚本化客户端
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    chunk_chars: usize,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            chunk_chars: 16,
        }
    }

    /// 每个 chunk 的字符数（至少 1）
    pub fn with_chunk_chars(mut self, n: usize) -> Self {
        self.chunk_chars = n.max(1);
        self
    }

    /// 每次请求时最后一条用户消息
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

/// 按字符切块（不切断 UTF-8 字符）
pub fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, ModelError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(last_user);
        }
        let reply = self
            .replies
            .lock()
            .map_err(|e| ModelError::Request(e.to_string()))?
            .pop_front()
            .ok_or_else(|| ModelError::Request("no scripted reply left".to_string()))?;
        let chunks: Vec<Result<String, String>> = chunk_text(&reply, self.chunk_chars.max(1))
            .into_iter()
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
