//! 命令修复：补全缺失的包管理器前缀、裸脚本名、拆分「命令粘连」
//!
//! 逐段处理 `&&` / `||` / `;` 链；每段按顺序尝试规则，首个命中即生效。
//! 启发式本身是近似的（未知多词序列会被当作隐式 `npm install`），因此隐式安装与粘连拆分可通过 RepairOptions 关闭。

use serde::Serialize;

use crate::command::classify::{
    is_binary_like, is_install_flag, is_known_binary, is_package_manager, is_script_name,
    is_short_install_flag, looks_like_package_name,
};
use crate::command::segments::{join_segments, split_segments, tokenize, Segment};

/// 修复结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRepairResult {
    pub command: String,
    pub was_repaired: bool,
    pub repairs: Vec<String>,
}

/// 可配置的启发式
#[derive(Debug, Clone)]
pub struct RepairOptions {
    /// 未知首词 + 包名序列视为隐式 `npm install`
    pub implicit_install: bool,
    /// 拆分 `<binary> ... install -D ...` 粘连
    pub fusion_split: bool,
    /// 追加到可执行程序白名单
    pub extra_binaries: Vec<String>,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            implicit_install: true,
            fusion_split: true,
            extra_binaries: Vec::new(),
        }
    }
}

/// 单段修复：新的一段或多段文本 + 描述
struct SegmentFix {
    replacement: Vec<Segment>,
    description: String,
}

impl SegmentFix {
    fn single(command: String, description: impl Into<String>) -> Self {
        Self {
            replacement: vec![Segment::Command(command)],
            description: description.into(),
        }
    }
}

/// 去掉粘连点前短 flag 末尾残留的 "npm" 字母（如 `-pm` → `-p`）；去完只剩 `-` 时返回 None
fn strip_npm_residue(flag: &str) -> Option<String> {
    if !flag.starts_with('-') || flag.starts_with("--") {
        return Some(flag.to_string());
    }
    let stripped = flag.trim_end_matches(['n', 'm']);
    if stripped.len() <= 1 {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// 命令修复器
#[derive(Debug, Clone, Default)]
pub struct CommandRepairer {
    options: RepairOptions,
}

impl CommandRepairer {
    pub fn new(options: RepairOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RepairOptions {
        &self.options
    }

    /// 修复整条命令；没有任何规则命中时原样返回
    pub fn repair(&self, command: &str) -> CommandRepairResult {
        let segments = split_segments(command);
        let mut out = Vec::with_capacity(segments.len());
        let mut repairs = Vec::new();

        for seg in segments {
            match seg {
                Segment::Command(cmd) => match self.repair_segment(&cmd) {
                    Some(fix) => {
                        tracing::warn!(segment = %cmd, repair = %fix.description, "command repaired");
                        repairs.push(fix.description);
                        out.extend(fix.replacement);
                    }
                    None => out.push(Segment::Command(cmd)),
                },
                sep => out.push(sep),
            }
        }

        if repairs.is_empty() {
            return CommandRepairResult {
                command: command.to_string(),
                was_repaired: false,
                repairs,
            };
        }
        CommandRepairResult {
            command: join_segments(&out),
            was_repaired: true,
            repairs,
        }
    }

    fn repair_segment(&self, segment: &str) -> Option<SegmentFix> {
        let tokens = tokenize(segment);
        let (&first, rest) = tokens.split_first()?;
        if is_package_manager(first) {
            return None;
        }
        let extra = &self.options.extra_binaries;

        if first == "install" {
            return Some(SegmentFix::single(
                format!("npm {segment}"),
                "added missing 'npm' before 'install'",
            ));
        }
        if first == "i" && rest.iter().any(|t| is_short_install_flag(t)) {
            return Some(SegmentFix::single(
                format!("npm {segment}"),
                "added missing 'npm' before 'i'",
            ));
        }
        if first == "add" && !rest.is_empty() {
            return Some(SegmentFix::single(
                format!("yarn {segment}"),
                "added missing 'yarn' before 'add'",
            ));
        }
        if first == "run" && !rest.is_empty() {
            return Some(SegmentFix::single(
                format!("npm {segment}"),
                "added missing 'npm' before 'run'",
            ));
        }
        if rest.is_empty() && is_script_name(first) {
            return Some(SegmentFix::single(
                format!("npm run {first}"),
                format!("bare script '{first}' turned into 'npm run {first}'"),
            ));
        }
        if is_install_flag(first) && !rest.is_empty() {
            return Some(SegmentFix::single(
                format!("npm install {segment}"),
                format!("install flag '{first}' without package manager"),
            ));
        }
        if self.options.implicit_install
            && !rest.is_empty()
            && !is_binary_like(first, extra)
            && looks_like_package_name(first)
            && rest
                .iter()
                .all(|t| looks_like_package_name(t) || is_install_flag(t))
        {
            return Some(SegmentFix::single(
                format!("npm install {segment}"),
                "package list without install command".to_string(),
            ));
        }
        if self.options.fusion_split && is_known_binary(first, extra) {
            return self.split_fusion(&tokens);
        }
        None
    }

    /// `<binary> ... install <flag> ...`：在 install 处拆成两条命令
    fn split_fusion(&self, tokens: &[&str]) -> Option<SegmentFix> {
        let at = (2..tokens.len()).find(|&i| {
            tokens[i] == "install"
                && tokens
                    .get(i + 1)
                    .map(|t| is_install_flag(t))
                    .unwrap_or(false)
        })?;
        // 引号内的 install 不是粘连
        if tokens[..at].iter().any(|t| t.contains('"') || t.contains('\'')) {
            return None;
        }

        let mut head: Vec<String> = tokens[..at].iter().map(|t| t.to_string()).collect();
        if let Some(prev) = head.pop() {
            if let Some(cleaned) = strip_npm_residue(&prev) {
                head.push(cleaned);
            }
        }
        let tail = tokens[at + 1..].join(" ");
        Some(SegmentFix {
            replacement: vec![
                Segment::Command(head.join(" ")),
                Segment::Separator("&&".to_string()),
                Segment::Command(format!("npm install {tail}")),
            ],
            description: format!("split fused command at 'install' after '{}'", tokens[0]),
        })
    }
}

/// 使用默认启发式修复命令
pub fn repair(command: &str) -> CommandRepairResult {
    CommandRepairer::default().repair(command)
}
