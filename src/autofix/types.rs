//! 自动修复数据类型：错误上下文、修复尝试记录、设置

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 错误来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    Terminal,
    Preview,
    Build,
}

impl ErrorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminal => "terminal",
            Self::Preview => "preview",
            Self::Build => "build",
        }
    }
}

/// 执行环境上报的运行时错误（已由上游分类）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub source: ErrorSource,
    pub error_type: String,
    pub message: String,
    pub content: String,
}

impl ErrorContext {
    pub fn new(
        source: ErrorSource,
        error_type: impl Into<String>,
        message: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source,
            error_type: error_type.into(),
            message: message.into(),
            content: content.into(),
        }
    }
}

/// 一次修复尝试的记录
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub error_message: String,
    pub error_content: String,
    pub was_successful: bool,
    pub duration_ms: u64,
}

/// 自动修复设置（独立于会话状态持久化）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoFixSettings {
    pub is_enabled: bool,
    pub max_retries: u32,
    pub delay_between_attempts_ms: u64,
    pub show_notifications: bool,
}

impl Default for AutoFixSettings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            max_retries: 3,
            delay_between_attempts_ms: 2000,
            show_notifications: true,
        }
    }
}

/// 可序列化的状态快照（供 UI / 日志）
#[derive(Clone, Debug, Serialize)]
pub struct AutoFixStatus {
    pub is_enabled: bool,
    pub is_fixing: bool,
    pub current_retries: u32,
    pub max_retries: u32,
    pub current_error: Option<ErrorContext>,
    pub attempts: usize,
    pub session_start_time: Option<DateTime<Utc>>,
}
