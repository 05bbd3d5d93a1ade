//! 内存执行沙箱：文件写入落在 FileMap，命令只记录不执行（可按命令预置输出）
//!
//! 用于回放与测试，也作为版本快照的 FileTreeSource。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::ExecutorError;
use crate::dispatch::{
    insert_with_parents, ActionExecutor, ExecutableAction, ExecutionOutput, FileEntry, FileMap,
    FileTreeSource,
};

#[derive(Default)]
struct WorkspaceState {
    files: FileMap,
    executed: Vec<ExecutableAction>,
}

/// 内存沙箱
#[derive(Default)]
pub struct MemoryWorkspace {
    state: Mutex<WorkspaceState>,
    outputs: HashMap<String, ExecutionOutput>,
    unavailable: bool,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置某条命令（规范化之后的文本）的执行结果；未预置的命令返回 exit 0
    pub fn with_output(mut self, command: impl Into<String>, output: ExecutionOutput) -> Self {
        self.outputs.insert(command.into(), output);
        self
    }

    /// 让 snapshot_files 返回错误（模拟沙箱未就绪）
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        let state = self.state.lock().ok()?;
        state.files.get(path).map(|e| e.content.clone())
    }

    pub fn files(&self) -> FileMap {
        self.state
            .lock()
            .map(|s| s.files.clone())
            .unwrap_or_default()
    }

    pub fn executed(&self) -> Vec<ExecutableAction> {
        self.state
            .lock()
            .map(|s| s.executed.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActionExecutor for MemoryWorkspace {
    async fn write_file(&self, path: &str, content: &str, _complete: bool) -> Result<(), ExecutorError> {
        if path.split('/').any(|p| p == "..") {
            return Err(ExecutorError::PathEscape(path.to_string()));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|e| ExecutorError::Failed(e.to_string()))?;
        insert_with_parents(&mut state.files, path, FileEntry::file(content));
        Ok(())
    }

    async fn execute(&self, action: &ExecutableAction) -> Result<ExecutionOutput, ExecutorError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| ExecutorError::Failed(e.to_string()))?;
        state.executed.push(action.clone());
        Ok(self
            .outputs
            .get(action.content.trim())
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl FileTreeSource for MemoryWorkspace {
    async fn snapshot_files(&self) -> Result<FileMap, ExecutorError> {
        if self.unavailable {
            return Err(ExecutorError::Failed("workspace not ready".to_string()));
        }
        Ok(self.files())
    }

    /// 整体替换当前文件
    async fn restore_files(&self, files: &FileMap) -> Result<(), ExecutorError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| ExecutorError::Failed(e.to_string()))?;
        state.files = files.clone();
        Ok(())
    }
}
