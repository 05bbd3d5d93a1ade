//! Action 分发器
//!
//! 把解析器事件变成对执行沙箱的调用：file Action 随流式内容增量写入，其余 Action 只在关闭（内容定稿）后执行。
//! shell / start 的命令先经 CommandNormalizer（rewrite → repair）；命令失败转为 ErrorContext 交给自动修复。
//! 每次执行输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::autofix::{ErrorContext, ErrorSource};
use crate::command::CommandNormalizer;
use crate::dispatch::{ActionExecutor, ExecutableAction, ExecutionOutput};
use crate::parser::{Action, ActionKind, ParserEvent};

/// 审计预览最大字符数
const PREVIEW_CHARS: usize = 200;

/// 单个事件的分发结果
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// 事件不需要执行任何东西
    Idle,
    /// 文件已写入（complete=false 为流式中间内容）
    FileWritten { path: String, complete: bool },
    /// Action 已执行且成功
    Executed {
        action: ExecutableAction,
        output: ExecutionOutput,
    },
    /// 未执行（未知 kind 等）
    Skipped { kind: String, reason: String },
    /// 执行失败；error 交给自动修复
    Failed {
        action: Option<ExecutableAction>,
        error: ErrorContext,
    },
}

impl DispatchOutcome {
    pub fn error(&self) -> Option<&ErrorContext> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}...", s.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 分发器：持有执行沙箱与命令规范化器
pub struct ActionDispatcher {
    executor: Arc<dyn ActionExecutor>,
    normalizer: CommandNormalizer,
}

impl ActionDispatcher {
    pub fn new(executor: Arc<dyn ActionExecutor>, normalizer: CommandNormalizer) -> Self {
        Self {
            executor,
            normalizer,
        }
    }

    /// 处理一个解析器事件
    pub async fn dispatch(&self, event: &ParserEvent) -> DispatchOutcome {
        match event {
            ParserEvent::ActionOpen { action, .. } => {
                if let ActionKind::File { file_path } = &action.kind {
                    tracing::debug!(path = %file_path, "file action opened");
                }
                DispatchOutcome::Idle
            }
            ParserEvent::ActionStream { action, .. } => match &action.kind {
                ActionKind::File { file_path } => {
                    self.write_file(file_path, &action.content, false).await
                }
                _ => DispatchOutcome::Idle,
            },
            ParserEvent::ActionClose {
                message_id,
                artifact_id,
                action_id,
                action,
            } => match &action.kind {
                ActionKind::File { file_path } => {
                    self.write_file(file_path, &action.content, true).await
                }
                ActionKind::Unknown { raw_type } => {
                    tracing::warn!(kind = %raw_type, message_id = %message_id, "skipping action of unknown type");
                    DispatchOutcome::Skipped {
                        kind: raw_type.clone(),
                        reason: "unknown action type".to_string(),
                    }
                }
                _ => {
                    let executable = self.prepare(message_id, artifact_id, *action_id, action);
                    self.execute(executable).await
                }
            },
            ParserEvent::ArtifactOpen { .. } | ParserEvent::ArtifactClose { .. } => {
                DispatchOutcome::Idle
            }
        }
    }

    /// 构造可执行 Action；shell / start 命令在这里规范化
    pub fn prepare(
        &self,
        message_id: &str,
        artifact_id: &str,
        action_id: usize,
        action: &Action,
    ) -> ExecutableAction {
        let (content, original_content) = if action.kind.is_command() {
            let normalized = self.normalizer.normalize(&action.content);
            if normalized.changed() {
                (normalized.command, Some(action.content.clone()))
            } else {
                (action.content.clone(), None)
            }
        } else {
            (action.content.clone(), None)
        };
        ExecutableAction {
            message_id: message_id.to_string(),
            artifact_id: artifact_id.to_string(),
            action_id,
            kind: action.kind.clone(),
            content,
            original_content,
        }
    }

    async fn write_file(&self, path: &str, content: &str, complete: bool) -> DispatchOutcome {
        match self.executor.write_file(path, content, complete).await {
            Ok(()) => {
                if complete {
                    tracing::info!(path = %path, bytes = content.len(), "file written");
                }
                DispatchOutcome::FileWritten {
                    path: path.to_string(),
                    complete,
                }
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "file write failed");
                DispatchOutcome::Failed {
                    action: None,
                    error: ErrorContext::new(
                        ErrorSource::Terminal,
                        "file-write-failed",
                        format!("Failed to write {path}: {e}"),
                        String::new(),
                    ),
                }
            }
        }
    }

    async fn execute(&self, action: ExecutableAction) -> DispatchOutcome {
        let start = Instant::now();
        let result = self.executor.execute(&action).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match &result {
            Ok(out) if out.success() => "ok",
            Ok(_) => "exit_nonzero",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "kind": action.kind.name(),
            "message_id": action.message_id,
            "action_id": action.action_id,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "content_preview": preview(&action.content),
            "normalized": action.original_content.is_some(),
        });
        tracing::info!(audit = %audit.to_string(), "action");

        let source = match action.kind {
            ActionKind::Build => ErrorSource::Build,
            _ => ErrorSource::Terminal,
        };
        match result {
            Ok(output) if output.success() => DispatchOutcome::Executed { action, output },
            Ok(output) => {
                let content = if output.stderr.trim().is_empty() {
                    output.stdout.clone()
                } else {
                    output.stderr.clone()
                };
                let error = ErrorContext::new(
                    source,
                    format!("{}-failed", action.kind.name()),
                    format!(
                        "Command `{}` exited with code {}",
                        preview(&action.content),
                        output.exit_code
                    ),
                    content,
                );
                DispatchOutcome::Failed {
                    action: Some(action),
                    error,
                }
            }
            Err(e) => {
                let error = ErrorContext::new(
                    source,
                    format!("{}-error", action.kind.name()),
                    e.to_string(),
                    action.content.clone(),
                );
                DispatchOutcome::Failed {
                    action: Some(action),
                    error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MemoryWorkspace;

    fn close(kind: ActionKind, content: &str) -> ParserEvent {
        ParserEvent::ActionClose {
            message_id: "m".into(),
            artifact_id: "a".into(),
            action_id: 1,
            action: Action {
                kind,
                content: content.into(),
            },
        }
    }

    #[tokio::test]
    async fn test_shell_is_normalized_before_execution() {
        let ws = Arc::new(MemoryWorkspace::new());
        let d = ActionDispatcher::new(ws.clone(), CommandNormalizer::default());
        let outcome = d.dispatch(&close(ActionKind::Shell, "install -D vite")).await;
        assert!(matches!(outcome, DispatchOutcome::Executed { .. }));
        let executed = ws.executed();
        assert_eq!(executed[0].content, "npm install -D vite");
        assert_eq!(executed[0].original_content.as_deref(), Some("install -D vite"));
    }

    #[tokio::test]
    async fn test_file_streaming_writes() {
        let ws = Arc::new(MemoryWorkspace::new());
        let d = ActionDispatcher::new(ws.clone(), CommandNormalizer::default());
        let kind = ActionKind::File {
            file_path: "src/a.ts".into(),
        };
        let stream = ParserEvent::ActionStream {
            message_id: "m".into(),
            artifact_id: "a".into(),
            action_id: 1,
            action: Action {
                kind: kind.clone(),
                content: "export".into(),
            },
        };
        assert!(matches!(
            d.dispatch(&stream).await,
            DispatchOutcome::FileWritten { complete: false, .. }
        ));
        assert_eq!(ws.file("src/a.ts").as_deref(), Some("export"));
        d.dispatch(&close(kind, "export const a = 1;\n")).await;
        assert_eq!(ws.file("src/a.ts").as_deref(), Some("export const a = 1;\n"));
        assert!(ws.executed().is_empty());
    }

    #[tokio::test]
    async fn test_failed_command_yields_error_context() {
        let ws = Arc::new(MemoryWorkspace::new().with_output(
            "npm run build",
            ExecutionOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "error TS2304: Cannot find name 'foo'".into(),
            },
        ));
        let d = ActionDispatcher::new(ws.clone(), CommandNormalizer::default());
        let outcome = d.dispatch(&close(ActionKind::Start, "run build")).await;
        let err = outcome.error().expect("failure expected");
        assert_eq!(err.source, ErrorSource::Terminal);
        assert_eq!(err.error_type, "start-failed");
        assert!(err.content.contains("TS2304"));
    }

    #[tokio::test]
    async fn test_unknown_kind_skipped() {
        let ws = Arc::new(MemoryWorkspace::new());
        let d = ActionDispatcher::new(ws.clone(), CommandNormalizer::default());
        let outcome = d
            .dispatch(&close(ActionKind::Unknown { raw_type: "deploy".into() }, "vercel --prod"))
            .await;
        assert!(matches!(outcome, DispatchOutcome::Skipped { .. }));
        assert!(ws.executed().is_empty());
    }

    #[tokio::test]
    async fn test_non_command_content_passed_verbatim() {
        let ws = Arc::new(MemoryWorkspace::new());
        let d = ActionDispatcher::new(ws.clone(), CommandNormalizer::default());
        d.dispatch(&close(
            ActionKind::Supabase {
                operation: crate::parser::SupabaseOperation::Query,
                project_id: None,
                file_path: None,
            },
            "install pg",
        ))
        .await;
        assert_eq!(ws.executed()[0].content, "install pg");
    }
}
