//! 工作台构建器：按配置组装解析器、沙箱、版本存储与自动修复
//!
//! 回放工具与测试共用同一套初始化逻辑；沙箱与存储可以显式注入，否则按配置选择本地目录或内存实现。

use std::sync::Arc;

use crate::autofix::AutoFixController;
use crate::command::CommandNormalizer;
use crate::config::AppConfig;
use crate::core::Workbench;
use crate::dispatch::{ActionDispatcher, ActionExecutor, FileTreeSource, LocalWorkspace, MemoryWorkspace};
use crate::llm::ModelClient;
use crate::memory::JsonFileStore;
use crate::parser::StreamingParser;
use crate::version::{JsonVersionStore, MemoryVersionStore, ThumbnailCapture, VersionSnapshotManager, VersionStore};

/// 工作台构建器
pub struct WorkbenchBuilder {
    config: AppConfig,
    chat_id: String,
    executor: Option<(Arc<dyn ActionExecutor>, Arc<dyn FileTreeSource>)>,
    store: Option<Arc<dyn VersionStore>>,
    thumbnails: Option<Arc<dyn ThumbnailCapture>>,
    model: Option<Arc<dyn ModelClient>>,
}

impl WorkbenchBuilder {
    pub fn new(config: AppConfig, chat_id: impl Into<String>) -> Self {
        Self {
            config,
            chat_id: chat_id.into(),
            executor: None,
            store: None,
            thumbnails: None,
            model: None,
        }
    }

    /// 注入同时提供执行与文件树的沙箱
    pub fn with_workspace<W>(mut self, workspace: Arc<W>) -> Self
    where
        W: ActionExecutor + FileTreeSource + 'static,
    {
        let executor: Arc<dyn ActionExecutor> = workspace.clone();
        let files: Arc<dyn FileTreeSource> = workspace;
        self.executor = Some((executor, files));
        self
    }

    pub fn with_version_store(mut self, store: Arc<dyn VersionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_thumbnails(mut self, capture: Arc<dyn ThumbnailCapture>) -> Self {
        self.thumbnails = Some(capture);
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    fn default_workspace(&self) -> anyhow::Result<(Arc<dyn ActionExecutor>, Arc<dyn FileTreeSource>)> {
        match &self.config.workspace.root {
            Some(root) => {
                let ws = Arc::new(LocalWorkspace::new(root, self.config.workspace.command_timeout_secs)?);
                tracing::info!(root = %ws.root().display(), "using local workspace");
                let executor: Arc<dyn ActionExecutor> = ws.clone();
                let files: Arc<dyn FileTreeSource> = ws;
                Ok((executor, files))
            }
            None => {
                tracing::info!("no workspace root configured, using in-memory workspace");
                let ws = Arc::new(MemoryWorkspace::new());
                let executor: Arc<dyn ActionExecutor> = ws.clone();
                let files: Arc<dyn FileTreeSource> = ws;
                Ok((executor, files))
            }
        }
    }

    fn default_store(&self) -> Arc<dyn VersionStore> {
        match &self.config.versions.store_dir {
            Some(dir) => Arc::new(JsonVersionStore::new(dir)),
            None => Arc::new(MemoryVersionStore::new()),
        }
    }

    /// 组装工作台并加载已持久化的版本
    pub async fn build(mut self) -> anyhow::Result<Workbench> {
        let (executor, files) = match self.executor.take() {
            Some(pair) => pair,
            None => self.default_workspace()?,
        };
        let store = self.store.take().unwrap_or_else(|| self.default_store());

        let mut versions = VersionSnapshotManager::new(self.chat_id.clone(), files, store)
            .with_options(self.config.versions.snapshot_options());
        if let Some(capture) = self.thumbnails.take() {
            versions = versions.with_thumbnails(capture);
        }
        if let Err(e) = versions.load().await {
            tracing::warn!(chat_id = %self.chat_id, error = %e, "failed to load versions, starting empty");
        }

        let auto_fix = match &self.config.auto_fix.settings_path {
            Some(path) => AutoFixController::with_store(
                JsonFileStore::new(path),
                self.config.auto_fix.settings(),
            ),
            None => AutoFixController::new(self.config.auto_fix.settings()),
        };

        let normalizer = CommandNormalizer::new(
            self.config.commands.rewrite_enabled,
            self.config.commands.repair_options(),
        );
        let mut workbench = Workbench::new(
            self.chat_id.clone(),
            StreamingParser::new(self.config.parser.options()),
            ActionDispatcher::new(executor, normalizer),
            Arc::new(versions),
            auto_fix,
        );
        if let Some(model) = self.model.take() {
            workbench = workbench.with_model(model);
        }
        Ok(workbench)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_with_local_workspace_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.workspace.root = Some(dir.path().join("ws"));
        cfg.versions.store_dir = Some(dir.path().join("versions"));
        let mut wb = WorkbenchBuilder::new(cfg, "chat-1").build().await.unwrap();
        wb.push_chunk(
            "m1",
            r#"<artifact id="a" title="A"><action type="file" filePath="index.html">hi</action></artifact>"#,
        )
        .await;
        assert_eq!(
            std::fs::read_to_string(dir.path().join("ws/index.html")).unwrap(),
            "hi\n"
        );
    }
}
