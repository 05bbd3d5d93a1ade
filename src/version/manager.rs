//! 版本快照管理器
//!
//! Artifact 关闭（或非 file Action 关闭）后按 message id 防抖 500ms 再快照：同一回复里的多个 Artifact 合并成一个版本，
//! 且每个 message id 至多一个版本。版本列表、已快照集合、待定标题放在同一把锁下（单写者），
//! 新版本与「旧 latest 翻为 false」在同一次更新中写入存储后才提交到内存。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

use crate::core::{DebounceTimers, VersionError};
use crate::dispatch::{FileMap, FileTreeSource};
use crate::memory::ChatMessage;
use crate::parser::ParserOptions;
use crate::version::history::{derive_versions_from_history, describe};
use crate::version::thumbnail::capture_or_fallback;
use crate::version::{push_latest, ProjectVersion, ThumbnailCapture, VersionEvent, VersionStore};

/// 快照时序参数
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub debounce: Duration,
    pub thumbnail_timeout: Duration,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            thumbnail_timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Default)]
struct ManagerState {
    versions: Vec<ProjectVersion>,
    snapshotted: HashSet<String>,
    /// message id → 防抖期间收集到的 Artifact 标题
    pending_titles: HashMap<String, Vec<String>>,
}

struct Shared {
    chat_id: String,
    files: Arc<dyn FileTreeSource>,
    store: Arc<dyn VersionStore>,
    thumbnails: Option<Arc<dyn ThumbnailCapture>>,
    options: SnapshotOptions,
    state: Mutex<ManagerState>,
    event_tx: Option<UnboundedSender<VersionEvent>>,
}

impl Shared {
    /// 创建版本；该消息已有版本时返回 Ok(None)
    async fn create(&self, message_id: &str) -> Result<Option<ProjectVersion>, VersionError> {
        let mut state = self.state.lock().await;
        if state.snapshotted.contains(message_id) {
            state.pending_titles.remove(message_id);
            tracing::debug!(message_id = %message_id, "message already snapshotted, skipping");
            return Ok(None);
        }
        let titles = state.pending_titles.remove(message_id).unwrap_or_default();

        let files = self
            .files
            .snapshot_files()
            .await
            .map_err(|e| VersionError::FileTree(e.to_string()))?;
        let title = titles
            .first()
            .cloned()
            .unwrap_or_else(|| format!("Version {}", state.versions.len() + 1));
        let thumbnail = capture_or_fallback(
            self.thumbnails.as_deref(),
            &files,
            message_id,
            &title,
            self.options.thumbnail_timeout,
        )
        .await;

        let mut version = ProjectVersion::new(message_id, title, describe(&titles), files);
        version.thumbnail = Some(thumbnail);

        let mut next = state.versions.clone();
        push_latest(&mut next, version.clone());
        self.store.save(&self.chat_id, &next).await?;

        state.versions = next;
        state.snapshotted.insert(message_id.to_string());
        tracing::info!(
            chat_id = %self.chat_id,
            message_id = %message_id,
            version_id = %version.id,
            files = version.file_count(),
            "version snapshot created"
        );
        Ok(Some(version))
    }

    fn notify(&self, event: VersionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// 单个聊天的版本管理器（由宿主显式构造）
pub struct VersionSnapshotManager {
    shared: Arc<Shared>,
    timers: DebounceTimers<String>,
}

impl VersionSnapshotManager {
    pub fn new(
        chat_id: impl Into<String>,
        files: Arc<dyn FileTreeSource>,
        store: Arc<dyn VersionStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                chat_id: chat_id.into(),
                files,
                store,
                thumbnails: None,
                options: SnapshotOptions::default(),
                state: Mutex::new(ManagerState::default()),
                event_tx: None,
            }),
            timers: DebounceTimers::new(),
        }
    }

    fn shared_mut(&mut self) -> Option<&mut Shared> {
        Arc::get_mut(&mut self.shared)
    }

    /// 构造阶段设置（尚未共享给后台任务时有效）
    pub fn with_options(mut self, options: SnapshotOptions) -> Self {
        if let Some(shared) = self.shared_mut() {
            shared.options = options;
        }
        self
    }

    pub fn with_thumbnails(mut self, capture: Arc<dyn ThumbnailCapture>) -> Self {
        if let Some(shared) = self.shared_mut() {
            shared.thumbnails = Some(capture);
        }
        self
    }

    /// 后台快照结果推送通道
    pub fn with_event_tx(mut self, tx: UnboundedSender<VersionEvent>) -> Self {
        if let Some(shared) = self.shared_mut() {
            shared.event_tx = Some(tx);
        }
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.shared.chat_id
    }

    /// 读取已持久化的版本，并把它们的 message id 标为已快照
    pub async fn load(&self) -> Result<usize, VersionError> {
        let mut versions = self.shared.store.load(&self.shared.chat_id).await?;
        // 旧数据可能有多个 latest，以最后一个为准
        let last = versions.len().checked_sub(1);
        for (i, v) in versions.iter_mut().enumerate() {
            v.is_latest = Some(i) == last;
        }
        let mut state = self.shared.state.lock().await;
        state.snapshotted = versions.iter().map(|v| v.message_id.clone()).collect();
        state.versions = versions;
        tracing::info!(chat_id = %self.shared.chat_id, count = state.versions.len(), "versions loaded");
        Ok(state.versions.len())
    }

    /// 尚无任何版本时，从聊天历史回溯生成并持久化；返回生成的数量
    pub async fn adopt_history(
        &self,
        messages: &[ChatMessage],
        options: &ParserOptions,
    ) -> Result<usize, VersionError> {
        let mut state = self.shared.state.lock().await;
        if !state.versions.is_empty() {
            return Ok(0);
        }
        let derived = derive_versions_from_history(messages, options);
        if derived.is_empty() {
            return Ok(0);
        }
        self.shared.store.save(&self.shared.chat_id, &derived).await?;
        state.snapshotted = derived.iter().map(|v| v.message_id.clone()).collect();
        state.versions = derived;
        Ok(state.versions.len())
    }

    /// 安排防抖快照；该消息已快照过则为 no-op。返回是否安排了定时器
    pub async fn schedule_snapshot(&self, message_id: &str, title: Option<&str>) -> bool {
        {
            let mut state = self.shared.state.lock().await;
            if state.snapshotted.contains(message_id) {
                tracing::debug!(message_id = %message_id, "snapshot already taken for message");
                return false;
            }
            let titles = state
                .pending_titles
                .entry(message_id.to_string())
                .or_default();
            if let Some(title) = title {
                if !titles.iter().any(|t| t == title) {
                    titles.push(title.to_string());
                }
            }
        }

        let shared = Arc::clone(&self.shared);
        let key = message_id.to_string();
        let fire_id = key.clone();
        self.timers
            .schedule(key, self.shared.options.debounce, move || async move {
                match shared.create(&fire_id).await {
                    Ok(Some(version)) => shared.notify(VersionEvent::Created {
                        version_id: version.id,
                        message_id: fire_id,
                    }),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(message_id = %fire_id, error = %e, "version snapshot failed");
                        shared.notify(VersionEvent::Failed {
                            message_id: fire_id,
                            error: e.to_string(),
                        });
                    }
                }
            });
        true
    }

    /// 立即快照（取消该消息的待定定时器）；错误直接返回给调用方
    pub async fn create_snapshot_now(
        &self,
        message_id: &str,
        title: Option<&str>,
    ) -> Result<Option<ProjectVersion>, VersionError> {
        self.timers.cancel(&message_id.to_string());
        if let Some(title) = title {
            let mut state = self.shared.state.lock().await;
            let titles = state
                .pending_titles
                .entry(message_id.to_string())
                .or_default();
            if !titles.iter().any(|t| t == title) {
                titles.push(title.to_string());
            }
        }
        self.shared.create(message_id).await
    }

    /// 取消某条消息的待定快照
    pub async fn cancel(&self, message_id: &str) -> bool {
        self.shared
            .state
            .lock()
            .await
            .pending_titles
            .remove(message_id);
        self.timers.cancel(&message_id.to_string())
    }

    /// 取消全部待定快照（会话重置时调用）
    pub async fn cancel_pending(&self) -> usize {
        self.shared.state.lock().await.pending_titles.clear();
        self.timers.cancel_all()
    }

    pub fn is_pending(&self, message_id: &str) -> bool {
        self.timers.is_pending(&message_id.to_string())
    }

    pub async fn list(&self) -> Vec<ProjectVersion> {
        self.shared.state.lock().await.versions.clone()
    }

    pub async fn get(&self, version_id: &str) -> Option<ProjectVersion> {
        self.shared
            .state
            .lock()
            .await
            .versions
            .iter()
            .find(|v| v.id == version_id)
            .cloned()
    }

    pub async fn latest(&self) -> Option<ProjectVersion> {
        self.shared
            .state
            .lock()
            .await
            .versions
            .iter()
            .find(|v| v.is_latest)
            .cloned()
    }

    /// 取出某版本的文件树，交给沙箱恢复
    pub async fn restore(&self, version_id: &str) -> Result<FileMap, VersionError> {
        let version = self
            .get(version_id)
            .await
            .ok_or_else(|| VersionError::UnknownVersion(version_id.to_string()))?;
        tracing::info!(version_id = %version_id, message_id = %version.message_id, "restoring version");
        Ok(version.files)
    }

    /// 把某版本的文件树写回沙箱，返回写入的文件树
    pub async fn apply_version(&self, version_id: &str) -> Result<FileMap, VersionError> {
        let files = self.restore(version_id).await?;
        self.shared
            .files
            .restore_files(&files)
            .await
            .map_err(|e| VersionError::FileTree(e.to_string()))?;
        Ok(files)
    }
}
