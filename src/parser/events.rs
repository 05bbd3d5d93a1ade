//! 解析器生命周期事件：artifact-open / action-open / action-stream / action-close / artifact-close
//!
//! 可序列化为 JSON（回放工具逐行输出）；action_id 在单条消息内递增唯一。

use serde::Serialize;

use crate::parser::{Action, Artifact, ArtifactHeader};

/// 单条生命周期事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParserEvent {
    /// Artifact 开始标签已完整识别
    ArtifactOpen { artifact: ArtifactHeader },
    /// Action 开始标签已完整识别；file 类型此时 content 为空
    ActionOpen {
        message_id: String,
        artifact_id: String,
        action_id: usize,
        action: Action,
    },
    /// file Action 的流式内容（content 为截至目前的完整前缀）
    ActionStream {
        message_id: String,
        artifact_id: String,
        action_id: usize,
        action: Action,
    },
    /// Action 结束；content 已定稿
    ActionClose {
        message_id: String,
        artifact_id: String,
        action_id: usize,
        action: Action,
    },
    /// Artifact 结束，携带全部子 Action
    ArtifactClose { artifact: Artifact },
}

impl ParserEvent {
    pub fn message_id(&self) -> &str {
        match self {
            Self::ArtifactOpen { artifact } => &artifact.message_id,
            Self::ArtifactClose { artifact } => &artifact.message_id,
            Self::ActionOpen { message_id, .. }
            | Self::ActionStream { message_id, .. }
            | Self::ActionClose { message_id, .. } => message_id,
        }
    }

    /// 是否为流式内容更新（不同切分方式下数量会不同）
    pub fn is_stream_update(&self) -> bool {
        matches!(self, Self::ActionStream { .. })
    }
}
