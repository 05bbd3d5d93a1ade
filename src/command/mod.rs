//! 命令规范化层：Token 分类、运行时改写、npm/yarn 命令修复
//!
//! shell 类 Action 交给沙箱前统一经过 `repair(rewrite(content))`。

pub mod classify;
pub mod repair;
pub mod rewrite;
pub mod segments;

pub use repair::{repair, CommandRepairResult, CommandRepairer, RepairOptions};
pub use rewrite::{rewrite, CommandRewriteResult, CommandRewriter};

use serde::Serialize;

/// 规范化结果：最终命令 + 两步的中间结果（便于审计日志）
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedCommand {
    pub command: String,
    pub rewrite: CommandRewriteResult,
    pub repair: CommandRepairResult,
}

impl NormalizedCommand {
    pub fn changed(&self) -> bool {
        self.rewrite.was_rewritten || self.repair.was_repaired
    }
}

/// 改写 + 修复的组合
pub struct CommandNormalizer {
    rewriter: Option<CommandRewriter>,
    repairer: CommandRepairer,
}

impl CommandNormalizer {
    pub fn new(rewrite_enabled: bool, options: RepairOptions) -> Self {
        Self {
            rewriter: rewrite_enabled.then(CommandRewriter::new),
            repairer: CommandRepairer::new(options),
        }
    }

    pub fn normalize(&self, command: &str) -> NormalizedCommand {
        let rewrite = match &self.rewriter {
            Some(rw) => rw.rewrite(command),
            None => CommandRewriteResult {
                command: command.to_string(),
                was_rewritten: false,
                original_command: None,
                reason: None,
            },
        };
        let repair = self.repairer.repair(&rewrite.command);
        let normalized = NormalizedCommand {
            command: repair.command.clone(),
            rewrite,
            repair,
        };
        if normalized.changed() {
            tracing::info!(original = %command, normalized = %normalized.command, "command normalized");
        }
        normalized
    }
}

impl Default for CommandNormalizer {
    fn default() -> Self {
        Self::new(true, RepairOptions::default())
    }
}
