//! JSON 文件持久化
//!
//! 单文件 JSON：不存在时 load 返回 None，save 时父目录不存在则自动创建。
//! 自动修复设置与聊天历史都用它落盘。

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::PersistenceError;
use crate::memory::ChatMessage;

/// 单个 JSON 文件
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    pub fn save<T: Serialize>(&self, value: &T) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(value)?)?;
        Ok(())
    }
}

/// 聊天历史持久化（回放工具与版本回溯使用）
#[derive(Debug, Clone)]
pub struct ChatHistoryPersistence {
    file: JsonFileStore,
}

impl ChatHistoryPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFileStore::new(path),
        }
    }

    /// 文件不存在时返回空 Vec
    pub fn load(&self) -> Result<Vec<ChatMessage>, PersistenceError> {
        Ok(self.file.load()?.unwrap_or_default())
    }

    pub fn save(&self, messages: &[ChatMessage]) -> Result<(), PersistenceError> {
        self.file.save(&messages)
    }
}
