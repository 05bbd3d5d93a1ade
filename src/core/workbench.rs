//! 工作台：单个聊天的管线主控
//!
//! Token 流 → StreamingParser → ActionDispatcher（file 增量写入，其余关闭后执行）→ VersionSnapshotManager（Artifact 关闭后防抖快照）。
//! 执行失败得到的 ErrorContext 交给 AutoFixController；允许继续时构建修复提示，向 ModelClient 请求新回复，回复再次进入同一条管线。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::autofix::{build_fix_prompt, AutoFixController, ErrorContext};
use crate::core::ModelError;
use crate::dispatch::{ActionDispatcher, DispatchOutcome};
use crate::llm::{ModelClient, TokenStream};
use crate::memory::{ChatHistory, ChatMessage};
use crate::parser::{ActionKind, ParserEvent, StreamingParser};
use crate::version::VersionSnapshotManager;

/// 一次 chunk 处理的结果
#[derive(Debug, Default, Serialize)]
pub struct ChunkReport {
    /// 新产生的纯文本（Artifact 之外的内容）
    pub text: String,
    pub events: Vec<ParserEvent>,
    pub outcomes: Vec<DispatchOutcome>,
}

impl ChunkReport {
    fn merge(&mut self, other: ChunkReport) {
        self.text.push_str(&other.text);
        self.events.extend(other.events);
        self.outcomes.extend(other.outcomes);
    }

    /// 本次处理中出现的执行错误
    pub fn errors(&self) -> Vec<ErrorContext> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error().cloned())
            .collect()
    }
}

/// 自动修复的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    /// 修复回复执行后没有新的错误
    Fixed { message_id: String },
    /// 不再重试（预算耗尽、已禁用或没有模型），错误原样交给用户
    Surfaced(ErrorContext),
    /// 修复进行中被取消（cancel_handle 或 reset）
    Cancelled,
}

/// 单个聊天的管线
pub struct Workbench {
    chat_id: String,
    parser: StreamingParser,
    parser_rx: UnboundedReceiver<ParserEvent>,
    dispatcher: ActionDispatcher,
    versions: Arc<VersionSnapshotManager>,
    auto_fix: AutoFixController,
    model: Option<Arc<dyn ModelClient>>,
    history: ChatHistory,
    /// artifact id → 标题（用于非 file Action 关闭时的快照标题）
    artifact_titles: HashMap<String, String>,
}

impl Workbench {
    pub fn new(
        chat_id: impl Into<String>,
        parser: StreamingParser,
        dispatcher: ActionDispatcher,
        versions: Arc<VersionSnapshotManager>,
        auto_fix: AutoFixController,
    ) -> Self {
        let (tx, parser_rx) = mpsc::unbounded_channel();
        Self {
            chat_id: chat_id.into(),
            parser: parser.with_event_tx(tx),
            parser_rx,
            dispatcher,
            versions,
            auto_fix,
            model: None,
            history: ChatHistory::new(),
            artifact_titles: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_history(mut self, history: ChatHistory) -> Self {
        self.history = history;
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn versions(&self) -> &Arc<VersionSnapshotManager> {
        &self.versions
    }

    pub fn auto_fix(&self) -> &AutoFixController {
        &self.auto_fix
    }

    pub fn auto_fix_mut(&mut self) -> &mut AutoFixController {
        &mut self.auto_fix
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// 传入某条消息截至目前的完整文本
    pub async fn process_chunk(&mut self, message_id: &str, cumulative: &str) -> ChunkReport {
        let text = self.parser.parse(message_id, cumulative);
        self.drain(text).await
    }

    /// 传入某条消息的新增文本
    pub async fn push_chunk(&mut self, message_id: &str, delta: &str) -> ChunkReport {
        let text = self.parser.push(message_id, delta);
        self.drain(text).await
    }

    /// 消息流结束
    pub async fn finish_message(&mut self, message_id: &str) -> ChunkReport {
        let text = self.parser.finish(message_id);
        self.drain(text).await
    }

    async fn drain(&mut self, text: String) -> ChunkReport {
        let mut report = ChunkReport {
            text,
            ..Default::default()
        };
        while let Ok(event) = self.parser_rx.try_recv() {
            let outcome = self.dispatcher.dispatch(&event).await;
            self.schedule_for(&event).await;
            if !matches!(outcome, DispatchOutcome::Idle) {
                report.outcomes.push(outcome);
            }
            report.events.push(event);
        }
        report
    }

    /// 非 file Action 关闭或 Artifact 关闭时安排快照
    async fn schedule_for(&mut self, event: &ParserEvent) {
        match event {
            ParserEvent::ArtifactOpen { artifact } => {
                self.artifact_titles
                    .insert(artifact.id.clone(), artifact.title.clone());
            }
            ParserEvent::ActionClose {
                message_id,
                artifact_id,
                action,
                ..
            } if !action.kind.is_file() && !matches!(action.kind, ActionKind::Unknown { .. }) => {
                let title = self.artifact_titles.get(artifact_id).cloned();
                self.versions
                    .schedule_snapshot(message_id, title.as_deref())
                    .await;
            }
            ParserEvent::ArtifactClose { artifact } => {
                self.artifact_titles.remove(&artifact.id);
                self.versions
                    .schedule_snapshot(&artifact.message_id, Some(&artifact.title))
                    .await;
            }
            _ => {}
        }
    }

    /// 消费一条助手回复的 Token 流，回复文本写入聊天历史
    pub async fn run_reply(
        &mut self,
        message_id: &str,
        mut stream: TokenStream,
    ) -> Result<ChunkReport, ModelError> {
        let mut report = ChunkReport::default();
        self.history
            .push(ChatMessage::assistant(String::new()).with_id(message_id));
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(delta) => {
                    self.history.append_assistant(message_id, &delta);
                    let r = self.push_chunk(message_id, &delta).await;
                    report.merge(r);
                }
                Err(e) => {
                    tracing::error!(message_id = %message_id, error = %e, "reply stream interrupted");
                    let r = self.finish_message(message_id).await;
                    report.merge(r);
                    return Err(ModelError::Stream(e));
                }
            }
        }
        let r = self.finish_message(message_id).await;
        report.merge(r);
        tracing::info!(
            message_id = %message_id,
            events = report.events.len(),
            errors = report.errors().len(),
            "reply processed"
        );
        Ok(report)
    }

    /// 向模型提交一条用户消息并处理回复；返回助手消息 id 与处理结果
    pub async fn submit(&mut self, prompt: &str) -> Result<(String, ChunkReport), ModelError> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| ModelError::Request("no model client configured".to_string()))?;
        self.history.push(ChatMessage::user(prompt));
        let stream = model.complete_stream(self.history.messages()).await?;
        let message_id = uuid::Uuid::new_v4().to_string();
        let report = self.run_reply(&message_id, stream).await?;
        Ok((message_id, report))
    }

    /// 处理执行环境上报的运行时错误：在重试预算内循环「等待 → 修复提示 → 新回复」
    ///
    /// 进行中可通过 `auto_fix().cancel_handle()` 从其他任务取消；取消后会话被重置并返回 Cancelled。
    pub async fn handle_runtime_error(&mut self, error: ErrorContext) -> FixOutcome {
        self.auto_fix.renew_cancel_handle();
        let mut current = error;
        loop {
            if self.auto_fix.has_exceeded_max_retries() || !self.auto_fix.should_continue_fix() {
                tracing::warn!(error_type = %current.error_type, "auto-fix budget unavailable, surfacing error");
                return FixOutcome::Surfaced(current);
            }
            if self.model.is_none() {
                tracing::warn!("no model client, surfacing error");
                return FixOutcome::Surfaced(current);
            }
            if self.auto_fix.current_retries() > 0 {
                let delay = self.auto_fix.schedule_next_attempt();
                if !delay.wait().await {
                    return self.cancel_fix();
                }
            }
            if !self.auto_fix.start_auto_fix(current.clone()) {
                return FixOutcome::Surfaced(current);
            }
            let prompt = build_fix_prompt(&self.auto_fix, &current);
            match self.submit(&prompt).await {
                Ok((message_id, report)) => match report.errors().into_iter().next() {
                    None => {
                        self.auto_fix.record_fix_attempt(true);
                        return FixOutcome::Fixed { message_id };
                    }
                    Some(next) => {
                        self.auto_fix.record_fix_attempt(false);
                        current = next;
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "fix request failed");
                    self.auto_fix.record_fix_attempt(false);
                }
            }
            if self.auto_fix.is_cancelled() {
                return self.cancel_fix();
            }
        }
    }

    fn cancel_fix(&mut self) -> FixOutcome {
        tracing::info!(chat_id = %self.chat_id, "auto-fix cancelled");
        self.auto_fix.reset_auto_fix();
        FixOutcome::Cancelled
    }

    /// 丢弃解析状态、取消待定快照与修复等待
    pub async fn reset(&mut self) {
        self.parser.reset();
        while self.parser_rx.try_recv().is_ok() {}
        self.artifact_titles.clear();
        let cancelled = self.versions.cancel_pending().await;
        self.auto_fix.reset_auto_fix();
        tracing::info!(chat_id = %self.chat_id, cancelled, "workbench reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autofix::{AutoFixSettings, ErrorSource};
    use crate::command::CommandNormalizer;
    use crate::dispatch::{ExecutionOutput, MemoryWorkspace};
    use crate::llm::ScriptedModel;
    use crate::version::{MemoryVersionStore, SnapshotOptions};
    use std::time::Duration;

    fn bench(ws: Arc<MemoryWorkspace>, max_retries: u32) -> Workbench {
        let versions = Arc::new(
            VersionSnapshotManager::new("chat", ws.clone(), Arc::new(MemoryVersionStore::new()))
                .with_options(SnapshotOptions {
                    debounce: Duration::from_millis(20),
                    thumbnail_timeout: Duration::from_millis(50),
                }),
        );
        Workbench::new(
            "chat",
            StreamingParser::default(),
            ActionDispatcher::new(ws, CommandNormalizer::default()),
            versions,
            AutoFixController::new(AutoFixSettings {
                max_retries,
                delay_between_attempts_ms: 1,
                ..AutoFixSettings::default()
            }),
        )
    }

    fn build_error() -> ErrorContext {
        ErrorContext::new(ErrorSource::Build, "build-failed", "vite build failed", "error")
    }

    #[tokio::test]
    async fn test_cumulative_chunks() {
        let ws = Arc::new(MemoryWorkspace::new());
        let mut wb = bench(ws.clone(), 3);
        let full = r#"Hi <artifact id="a" title="A"><action type="file" filePath="x.txt">hello</action></artifact> bye"#;
        let mut text = String::new();
        for end in [10, 40, 70, full.len()] {
            text.push_str(&wb.process_chunk("m1", &full[..end]).await.text);
        }
        text.push_str(&wb.finish_message("m1").await.text);
        assert_eq!(text, "Hi  bye");
        assert_eq!(ws.file("x.txt").as_deref(), Some("hello\n"));
    }

    #[tokio::test]
    async fn test_fix_succeeds_on_clean_reply() {
        let ws = Arc::new(MemoryWorkspace::new());
        let model = Arc::new(ScriptedModel::new([
            r#"<artifact id="fix" title="Fix"><action type="file" filePath="src/main.ts">ok</action></artifact>"#,
        ]));
        let mut wb = bench(ws, 3).with_model(model.clone());
        let outcome = wb.handle_runtime_error(build_error()).await;
        assert!(matches!(outcome, FixOutcome::Fixed { .. }));
        assert_eq!(wb.auto_fix().current_retries(), 0);
        assert!(model.prompts()[0].contains("vite build failed"));
    }

    #[tokio::test]
    async fn test_budget_exhausted_surfaces_last_error() {
        let failing = ExecutionOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "still broken".into(),
        };
        let ws = Arc::new(MemoryWorkspace::new().with_output("npm run build", failing));
        let reply = r#"<artifact id="f" title="Try"><action type="shell">npm run build</action></artifact>"#;
        let model = Arc::new(ScriptedModel::new([reply, reply, reply]));
        let mut wb = bench(ws, 2).with_model(model.clone());
        let outcome = wb.handle_runtime_error(build_error()).await;
        match outcome {
            FixOutcome::Surfaced(e) => assert_eq!(e.content, "still broken"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(wb.auto_fix().has_exceeded_max_retries());
        assert_eq!(model.remaining(), 1);
        assert!(model.prompts()[1].contains("Previous auto-fix attempts"));
    }

    #[tokio::test]
    async fn test_cancel_during_retry_delay() {
        let failing = ExecutionOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "still broken".into(),
        };
        let ws = Arc::new(MemoryWorkspace::new().with_output("npm run build", failing));
        let reply = r#"<artifact id="f" title="Try"><action type="shell">npm run build</action></artifact>"#;
        let model = Arc::new(ScriptedModel::new([reply, reply]));
        let mut wb = bench(ws, 3).with_model(model.clone());
        wb.auto_fix_mut()
            .update_settings(AutoFixSettings {
                max_retries: 3,
                delay_between_attempts_ms: 10_000,
                ..AutoFixSettings::default()
            })
            .unwrap();

        let cancel = wb.auto_fix().cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(2), wb.handle_runtime_error(build_error()))
            .await
            .expect("cancel should end the retry delay");
        assert_eq!(outcome, FixOutcome::Cancelled);
        assert_eq!(model.remaining(), 1);
        assert_eq!(wb.auto_fix().current_retries(), 0);
        assert!(!wb.auto_fix().is_fixing());

        // 取消不影响下一次修复
        wb.auto_fix_mut()
            .update_settings(AutoFixSettings {
                max_retries: 3,
                delay_between_attempts_ms: 1,
                ..AutoFixSettings::default()
            })
            .unwrap();
        let outcome = wb.handle_runtime_error(build_error()).await;
        assert!(matches!(outcome, FixOutcome::Surfaced(_)));
        assert_eq!(model.remaining(), 0);
        assert!(wb.auto_fix().has_exceeded_max_retries());
    }

    #[tokio::test]
    async fn test_no_model_surfaces() {
        let ws = Arc::new(MemoryWorkspace::new());
        let mut wb = bench(ws, 3);
        let e = build_error();
        assert_eq!(wb.handle_runtime_error(e.clone()).await, FixOutcome::Surfaced(e));
        assert_eq!(wb.auto_fix().current_retries(), 0);
    }
}
