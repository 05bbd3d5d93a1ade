//! 版本数据类型

use serde::{Deserialize, Serialize};

use crate::dispatch::FileMap;

/// 一个时间点的工作区快照；每个聊天至多一个 is_latest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectVersion {
    pub id: String,
    pub message_id: String,
    pub title: String,
    pub description: String,
    pub timestamp_ms: i64,
    pub files: FileMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub is_latest: bool,
}

impl ProjectVersion {
    pub fn new(
        message_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        files: FileMap,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.into(),
            title: title.into(),
            description: description.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            files,
            thumbnail: None,
            is_latest: true,
        }
    }

    pub fn file_count(&self) -> usize {
        self.files
            .values()
            .filter(|e| e.file_type == crate::dispatch::FileType::File)
            .count()
    }
}

/// 追加新版本：先把其余版本的 is_latest 翻为 false，再推入（同一次更新内完成）
pub fn push_latest(versions: &mut Vec<ProjectVersion>, mut version: ProjectVersion) {
    for v in versions.iter_mut() {
        v.is_latest = false;
    }
    version.is_latest = true;
    versions.push(version);
}

/// 后台快照结果通知
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionEvent {
    Created { version_id: String, message_id: String },
    Failed { message_id: String, error: String },
}
