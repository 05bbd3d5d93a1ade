//! 自动修复控制器
//!
//! idle → fixing → idle。start_auto_fix 在禁用、重试已达上限或已有修复进行中时拒绝；
//! record_fix_attempt(true) 整体重置会话，record_fix_attempt(false) 只清 is_fixing，保留错误与历史供下一次提示使用。
//! 两次尝试间的等待是可取消的（reset_auto_fix 会取消它，不留悬挂定时器）。
//! cancel_handle 返回可跨任务持有的取消句柄：修复进行中也能从别处取消，不需要 &mut 访问。

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::autofix::{AutoFixSettings, AutoFixStatus, ErrorContext, FixAttempt};
use crate::core::PersistenceError;
use crate::memory::JsonFileStore;

/// 尝试间的可取消等待
#[derive(Debug)]
pub struct PendingDelay {
    token: CancellationToken,
    delay: Duration,
}

impl PendingDelay {
    /// 等待结束返回 true；被 reset 取消返回 false
    pub async fn wait(self) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => true,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// 自动修复状态机
#[derive(Debug)]
pub struct AutoFixController {
    settings: AutoFixSettings,
    current_retries: u32,
    is_fixing: bool,
    current_error: Option<ErrorContext>,
    fix_history: Vec<FixAttempt>,
    session_start_time: Option<chrono::DateTime<Utc>>,
    attempt_started: Option<Instant>,
    pending_delay: Option<CancellationToken>,
    /// 会话级取消；每个等待都是它的子 token
    session_cancel: CancellationToken,
    store: Option<JsonFileStore>,
}

impl AutoFixController {
    pub fn new(settings: AutoFixSettings) -> Self {
        Self {
            settings,
            current_retries: 0,
            is_fixing: false,
            current_error: None,
            fix_history: Vec::new(),
            session_start_time: None,
            attempt_started: None,
            pending_delay: None,
            session_cancel: CancellationToken::new(),
            store: None,
        }
    }

    /// 从设置文件加载（不存在或损坏时用 fallback），之后 update_settings 会写回该文件
    pub fn with_store(store: JsonFileStore, fallback: AutoFixSettings) -> Self {
        let settings = match store.load::<AutoFixSettings>() {
            Ok(Some(s)) => s,
            Ok(None) => fallback,
            Err(e) => {
                tracing::warn!(path = %store.path().display(), error = %e, "auto-fix settings unreadable, using defaults");
                fallback
            }
        };
        let mut controller = Self::new(settings);
        controller.store = Some(store);
        controller
    }

    pub fn settings(&self) -> &AutoFixSettings {
        &self.settings
    }

    /// 更新并持久化设置；会话状态不受影响
    pub fn update_settings(&mut self, settings: AutoFixSettings) -> Result<(), PersistenceError> {
        self.settings = settings;
        if let Some(store) = &self.store {
            store.save(&self.settings)?;
        }
        Ok(())
    }

    /// 开始一次修复；条件不满足时返回 false 且不改变任何状态
    pub fn start_auto_fix(&mut self, error: ErrorContext) -> bool {
        if !self.settings.is_enabled {
            tracing::debug!("auto-fix disabled");
            return false;
        }
        if self.is_fixing {
            tracing::debug!("auto-fix already in progress");
            return false;
        }
        if self.has_exceeded_max_retries() {
            tracing::info!(retries = self.current_retries, "auto-fix retry budget exhausted");
            return false;
        }
        if self.current_retries == 0 {
            self.session_start_time = Some(Utc::now());
        }
        self.current_retries += 1;
        self.is_fixing = true;
        self.attempt_started = Some(Instant::now());
        tracing::info!(
            attempt = self.current_retries,
            max = self.settings.max_retries,
            source = error.source.as_str(),
            error_type = %error.error_type,
            "auto-fix started"
        );
        self.current_error = Some(error);
        true
    }

    /// 记录本次修复结果
    pub fn record_fix_attempt(&mut self, success: bool) {
        if !self.is_fixing {
            tracing::warn!("record_fix_attempt called with no fix in progress");
            return;
        }
        let duration_ms = self
            .attempt_started
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let (error_type, error_message, error_content) = match &self.current_error {
            Some(e) => (e.error_type.clone(), e.message.clone(), e.content.clone()),
            None => Default::default(),
        };
        self.fix_history.push(FixAttempt {
            timestamp: Utc::now(),
            error_type,
            error_message,
            error_content,
            was_successful: success,
            duration_ms,
        });
        self.is_fixing = false;
        tracing::info!(success, attempt = self.current_retries, duration_ms, "auto-fix attempt recorded");

        if success {
            self.reset_session();
        }
    }

    pub fn should_continue_fix(&self) -> bool {
        self.settings.is_enabled && !self.is_fixing && self.current_retries < self.settings.max_retries
    }

    pub fn has_exceeded_max_retries(&self) -> bool {
        self.current_retries >= self.settings.max_retries
    }

    pub fn is_fixing(&self) -> bool {
        self.is_fixing
    }

    pub fn current_retries(&self) -> u32 {
        self.current_retries
    }

    pub fn current_error(&self) -> Option<&ErrorContext> {
        self.current_error.as_ref()
    }

    pub fn fix_history(&self) -> &[FixAttempt] {
        &self.fix_history
    }

    /// 按顺序编号的历史，拼进下一次提示；无历史时为空串
    pub fn get_fix_history_context(&self) -> String {
        if self.fix_history.is_empty() {
            return String::new();
        }
        let mut s = String::from("Previous auto-fix attempts in this session:\n");
        for (i, attempt) in self.fix_history.iter().enumerate() {
            let outcome = if attempt.was_successful {
                "succeeded"
            } else {
                "failed"
            };
            s.push_str(&format!(
                "{}. [{}] {} ({}, {}ms)\n",
                i + 1,
                attempt.error_type,
                attempt.error_message,
                outcome,
                attempt.duration_ms
            ));
        }
        s
    }

    /// 安排下一次尝试前的等待；已有的等待会被取消
    pub fn schedule_next_attempt(&mut self) -> PendingDelay {
        if let Some(prev) = self.pending_delay.take() {
            prev.cancel();
        }
        let token = self.session_cancel.child_token();
        self.pending_delay = Some(token.clone());
        PendingDelay {
            token,
            delay: Duration::from_millis(self.settings.delay_between_attempts_ms),
        }
    }

    /// 取消句柄：cancel() 立即结束当前等待，持有方无需借用控制器
    pub fn cancel_handle(&self) -> CancellationToken {
        self.session_cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.session_cancel.is_cancelled()
    }

    /// 已被取消的句柄换成新的，之前的取消不影响新的修复会话
    pub fn renew_cancel_handle(&mut self) {
        if self.session_cancel.is_cancelled() {
            self.session_cancel = CancellationToken::new();
        }
    }

    /// 完全重置（可在任意时刻调用）：清空重试、历史、错误，并取消待定的等待
    pub fn reset_auto_fix(&mut self) {
        self.session_cancel.cancel();
        self.session_cancel = CancellationToken::new();
        self.reset_session();
        self.is_fixing = false;
        self.attempt_started = None;
        tracing::debug!("auto-fix reset");
    }

    fn reset_session(&mut self) {
        if let Some(token) = self.pending_delay.take() {
            token.cancel();
        }
        self.current_retries = 0;
        self.current_error = None;
        self.fix_history.clear();
        self.session_start_time = None;
    }

    pub fn status(&self) -> AutoFixStatus {
        AutoFixStatus {
            is_enabled: self.settings.is_enabled,
            is_fixing: self.is_fixing,
            current_retries: self.current_retries,
            max_retries: self.settings.max_retries,
            current_error: self.current_error.clone(),
            attempts: self.fix_history.len(),
            session_start_time: self.session_start_time,
        }
    }
}

impl Default for AutoFixController {
    fn default() -> Self {
        Self::new(AutoFixSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autofix::ErrorSource;

    fn err(msg: &str) -> ErrorContext {
        ErrorContext::new(ErrorSource::Terminal, "command-failed", msg, "stderr output")
    }

    #[test]
    fn test_start_while_fixing_rejected() {
        let mut c = AutoFixController::default();
        assert!(c.start_auto_fix(err("a")));
        assert_eq!(c.current_retries(), 1);
        assert!(!c.start_auto_fix(err("b")));
        assert_eq!(c.current_retries(), 1);
        assert_eq!(c.current_error().unwrap().message, "a");
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let mut c = AutoFixController::default();
        for i in 0..3 {
            assert!(c.should_continue_fix());
            assert!(c.start_auto_fix(err(&format!("e{i}"))));
            c.record_fix_attempt(false);
        }
        assert!(c.has_exceeded_max_retries());
        assert!(!c.should_continue_fix());
        assert!(!c.start_auto_fix(err("again")));
        assert_eq!(c.fix_history().len(), 3);
        assert_eq!(c.current_error().unwrap().message, "e2");
    }

    #[test]
    fn test_success_resets_session() {
        let mut c = AutoFixController::default();
        assert!(c.start_auto_fix(err("a")));
        assert!(c.status().session_start_time.is_some());
        c.record_fix_attempt(false);
        assert!(!c.is_fixing());
        assert!(c.current_error().is_some());
        assert!(c.start_auto_fix(err("a")));
        c.record_fix_attempt(true);
        assert_eq!(c.current_retries(), 0);
        assert!(c.fix_history().is_empty());
        assert!(c.current_error().is_none());
        assert!(c.status().session_start_time.is_none());
    }

    #[test]
    fn test_disabled_rejects() {
        let mut c = AutoFixController::new(AutoFixSettings {
            is_enabled: false,
            ..AutoFixSettings::default()
        });
        assert!(!c.start_auto_fix(err("a")));
        assert_eq!(c.current_retries(), 0);
        assert!(!c.should_continue_fix());
    }

    #[test]
    fn test_history_context() {
        let mut c = AutoFixController::default();
        assert_eq!(c.get_fix_history_context(), "");
        c.start_auto_fix(err("Cannot find module 'react'"));
        c.record_fix_attempt(false);
        c.start_auto_fix(err("Unexpected token"));
        c.record_fix_attempt(false);
        let ctx = c.get_fix_history_context();
        assert!(ctx.contains("1. [command-failed] Cannot find module 'react' (failed"));
        assert!(ctx.contains("2. [command-failed] Unexpected token (failed"));
    }

    #[test]
    fn test_record_without_start_ignored() {
        let mut c = AutoFixController::default();
        c.record_fix_attempt(false);
        assert!(c.fix_history().is_empty());
        assert_eq!(c.current_retries(), 0);
    }

    #[tokio::test]
    async fn test_reset_cancels_pending_delay() {
        let mut c = AutoFixController::new(AutoFixSettings {
            delay_between_attempts_ms: 10_000,
            ..AutoFixSettings::default()
        });
        c.start_auto_fix(err("a"));
        c.record_fix_attempt(false);
        let delay = c.schedule_next_attempt();
        let waiter = tokio::spawn(delay.wait());
        c.reset_auto_fix();
        let completed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("delay should be cancelled promptly")
            .unwrap();
        assert!(!completed);
        assert_eq!(c.current_retries(), 0);
    }

    #[tokio::test]
    async fn test_cancel_handle_ends_wait_from_another_task() {
        let mut c = AutoFixController::new(AutoFixSettings {
            delay_between_attempts_ms: 10_000,
            ..AutoFixSettings::default()
        });
        let handle = c.cancel_handle();
        let delay = c.schedule_next_attempt();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });
        let completed = tokio::time::timeout(Duration::from_secs(1), delay.wait())
            .await
            .expect("delay should be cancelled promptly");
        assert!(!completed);
        assert!(c.is_cancelled());

        c.renew_cancel_handle();
        assert!(!c.is_cancelled());
        c.update_settings(AutoFixSettings {
            delay_between_attempts_ms: 5,
            ..AutoFixSettings::default()
        })
        .unwrap();
        assert!(c.schedule_next_attempt().wait().await);
    }

    #[tokio::test]
    async fn test_delay_elapses() {
        let mut c = AutoFixController::new(AutoFixSettings {
            delay_between_attempts_ms: 5,
            ..AutoFixSettings::default()
        });
        assert!(c.schedule_next_attempt().wait().await);
    }

    #[test]
    fn test_settings_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("autofix.json"));
        let mut c = AutoFixController::with_store(store.clone(), AutoFixSettings::default());
        assert_eq!(c.settings().max_retries, 3);
        c.update_settings(AutoFixSettings {
            max_retries: 5,
            ..AutoFixSettings::default()
        })
        .unwrap();
        let reloaded = AutoFixController::with_store(store, AutoFixSettings::default());
        assert_eq!(reloaded.settings().max_retries, 5);
    }
}
