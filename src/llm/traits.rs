//! 模型客户端抽象
//!
//! Provider 本身在管线之外：这里只要求给定消息历史返回一个 Token 流。
//! 自动修复把修复提示作为新的用户消息提交，回复流再次进入解析器。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::core::ModelError;
use crate::memory::ChatMessage;

/// 助手回复的 Token 流
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>;

/// 模型客户端 trait：流式完成
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// 流式完成，返回 Token 流
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, ModelError>;
}
