//! 版本存储：按 chat id 的 key-value load/save
//!
//! JsonVersionStore 每个聊天一个 JSON 文件（`<dir>/<编码后的 chat_id>.json`），写入先落临时文件再 rename。
//! 文件名编码是单射的：字母数字与 `-` 原样保留，其余字节（包括 `_`）写成 `_xx`。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::PersistenceError;
use crate::version::ProjectVersion;

/// 版本持久化契约
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// 不存在时返回空 Vec
    async fn load(&self, chat_id: &str) -> Result<Vec<ProjectVersion>, PersistenceError>;

    async fn save(&self, chat_id: &str, versions: &[ProjectVersion]) -> Result<(), PersistenceError>;
}

/// 内存存储（测试 / 回放）
#[derive(Default)]
pub struct MemoryVersionStore {
    inner: Mutex<HashMap<String, Vec<ProjectVersion>>>,
    fail_saves: bool,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有 save 返回 Unavailable（模拟存储故障）
    pub fn failing() -> Self {
        Self {
            inner: Mutex::default(),
            fail_saves: true,
        }
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn load(&self, chat_id: &str) -> Result<Vec<ProjectVersion>, PersistenceError> {
        Ok(self.inner.lock().await.get(chat_id).cloned().unwrap_or_default())
    }

    async fn save(&self, chat_id: &str, versions: &[ProjectVersion]) -> Result<(), PersistenceError> {
        if self.fail_saves {
            return Err(PersistenceError::Unavailable("memory store rejects writes".into()));
        }
        self.inner
            .lock()
            .await
            .insert(chat_id.to_string(), versions.to_vec());
        Ok(())
    }
}

/// 目录下每个聊天一个 JSON 文件
#[derive(Debug, Clone)]
pub struct JsonVersionStore {
    dir: PathBuf,
}

impl JsonVersionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, chat_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_chat_id(chat_id)))
    }
}

fn encode_chat_id(chat_id: &str) -> String {
    let mut out = String::with_capacity(chat_id.len());
    for b in chat_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{b:02x}"));
        }
    }
    out
}

#[async_trait]
impl VersionStore for JsonVersionStore {
    async fn load(&self, chat_id: &str) -> Result<Vec<ProjectVersion>, PersistenceError> {
        let path = self.path_for(chat_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, chat_id: &str, versions: &[ProjectVersion]) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(chat_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(versions)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(path = %path.display(), count = versions.len(), "versions saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{FileEntry, FileMap};

    #[tokio::test]
    async fn test_json_store_persists_per_chat() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonVersionStore::new(dir.path());
        assert!(store.load("chat/1").await.unwrap().is_empty());

        let mut files = FileMap::new();
        files.insert("index.html".into(), FileEntry::file("<html></html>"));
        let v = ProjectVersion::new("m1", "Landing page", "", files);
        store.save("chat/1", &[v.clone()]).await.unwrap();

        let loaded = store.load("chat/1").await.unwrap();
        assert_eq!(loaded, vec![v]);
        assert!(store.load("chat-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similar_chat_ids_keep_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonVersionStore::new(dir.path());
        let ids = ["chat/1", "chat_1", "chat.1", "chat 1", "chat_2f1"];
        for id in ids {
            let v = ProjectVersion::new(format!("m-{id}"), id, "", FileMap::new());
            store.save(id, &[v]).await.unwrap();
        }
        for id in ids {
            let loaded = store.load(id).await.unwrap();
            assert_eq!(loaded.len(), 1, "chat {id}");
            assert_eq!(loaded[0].message_id, format!("m-{id}"));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), ids.len());
    }

    #[test]
    fn test_encode_chat_id() {
        assert_eq!(encode_chat_id("chat-1"), "chat-1");
        assert_eq!(encode_chat_id("chat/1"), "chat_2f1");
        assert_eq!(encode_chat_id("chat_1"), "chat_5f1");
        assert_eq!(encode_chat_id("会"), "_e4_bc_9a");
    }

    #[tokio::test]
    async fn test_failing_memory_store() {
        let store = MemoryVersionStore::failing();
        assert!(store.save("c", &[]).await.is_err());
    }
}
