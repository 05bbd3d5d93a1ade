//! 执行沙箱接口
//!
//! 沙箱本身是外部协作者：ActionExecutor 接收规范化后的 Action 并返回 stdout/stderr/退出码，
//! FileTreeSource 在快照时给出完整文件树。MemoryWorkspace / LocalWorkspace 是两个内置实现。

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ExecutorError;
use crate::parser::ActionKind;

/// 文件树条目类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Folder,
}

/// 文件树条目：内容 + 类型（目录内容为空）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub content: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

impl FileEntry {
    pub fn file(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            file_type: FileType::File,
        }
    }

    pub fn folder() -> Self {
        Self {
            content: String::new(),
            file_type: FileType::Folder,
        }
    }
}

/// 路径 → 条目（有序，快照与比较稳定）
pub type FileMap = BTreeMap<String, FileEntry>;

/// 把 `a/b/c.ts` 的所有父目录补为 Folder 条目
pub fn insert_with_parents(files: &mut FileMap, path: &str, entry: FileEntry) {
    let mut prefix = String::new();
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if let Some((_, dirs)) = parts.split_last() {
        for dir in dirs {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(dir);
            files.entry(prefix.clone()).or_insert_with(FileEntry::folder);
        }
    }
    files.insert(parts.join("/"), entry);
}

/// 交给沙箱执行的非 file Action（shell / start 的 content 已规范化）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutableAction {
    pub message_id: String,
    pub artifact_id: String,
    pub action_id: usize,
    #[serde(flatten)]
    pub kind: ActionKind,
    pub content: String,
    /// 规范化前的原始命令（有改动时）
    pub original_content: Option<String>,
}

/// 执行结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// 执行沙箱
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// 写文件；complete=false 表示流式中间内容
    async fn write_file(&self, path: &str, content: &str, complete: bool) -> Result<(), ExecutorError>;

    /// 执行非 file Action
    async fn execute(&self, action: &ExecutableAction) -> Result<ExecutionOutput, ExecutorError>;
}

/// 文件树来源（版本快照读取与恢复）
#[async_trait]
pub trait FileTreeSource: Send + Sync {
    async fn snapshot_files(&self) -> Result<FileMap, ExecutorError>;

    /// 把版本文件树写回沙箱
    async fn restore_files(&self, files: &FileMap) -> Result<(), ExecutorError>;
}
