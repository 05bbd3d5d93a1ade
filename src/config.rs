//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `KILN__*` 覆盖（双下划线表示嵌套，如 `KILN__AUTO_FIX__MAX_RETRIES=5`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::autofix::AutoFixSettings;
use crate::command::RepairOptions;
use crate::parser::ParserOptions;
use crate::version::SnapshotOptions;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub parser: ParserSection,
    pub commands: CommandsSection,
    pub auto_fix: AutoFixSection,
    pub versions: VersionsSection,
    pub workspace: WorkspaceSection,
}

/// [parser] 段：标签名
#[derive(Debug, Clone, Deserialize)]
pub struct ParserSection {
    #[serde(default = "default_artifact_tag")]
    pub artifact_tag: String,
    #[serde(default = "default_action_tag")]
    pub action_tag: String,
}

fn default_artifact_tag() -> String {
    "artifact".to_string()
}

fn default_action_tag() -> String {
    "action".to_string()
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            artifact_tag: default_artifact_tag(),
            action_tag: default_action_tag(),
        }
    }
}

impl ParserSection {
    pub fn options(&self) -> ParserOptions {
        ParserOptions {
            artifact_tag: self.artifact_tag.clone(),
            action_tag: self.action_tag.clone(),
        }
    }
}

/// [commands] 段：命令规范化的启发式开关
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsSection {
    /// 「全是包名」的命令是否视为隐式 npm install
    #[serde(default = "default_true")]
    pub implicit_install: bool,
    /// 是否拆分粘连命令（`npx ... install -D x`）
    #[serde(default = "default_true")]
    pub fusion_split: bool,
    /// 追加到已知可执行文件列表
    #[serde(default)]
    pub extra_binaries: Vec<String>,
    #[serde(default = "default_true")]
    pub rewrite_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            implicit_install: true,
            fusion_split: true,
            extra_binaries: Vec::new(),
            rewrite_enabled: true,
        }
    }
}

impl CommandsSection {
    pub fn repair_options(&self) -> RepairOptions {
        RepairOptions {
            implicit_install: self.implicit_install,
            fusion_split: self.fusion_split,
            extra_binaries: self.extra_binaries.clone(),
        }
    }
}

/// [auto_fix] 段：初始设置（settings_path 存在时以文件内容为准）
#[derive(Debug, Clone, Deserialize)]
pub struct AutoFixSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_delay_between_attempts_ms")]
    pub delay_between_attempts_ms: u64,
    #[serde(default = "default_true")]
    pub show_notifications: bool,
    /// 设置持久化文件（JSON）
    pub settings_path: Option<PathBuf>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay_between_attempts_ms() -> u64 {
    2000
}

impl Default for AutoFixSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            delay_between_attempts_ms: default_delay_between_attempts_ms(),
            show_notifications: true,
            settings_path: None,
        }
    }
}

impl AutoFixSection {
    pub fn settings(&self) -> AutoFixSettings {
        AutoFixSettings {
            is_enabled: self.enabled,
            max_retries: self.max_retries,
            delay_between_attempts_ms: self.delay_between_attempts_ms,
            show_notifications: self.show_notifications,
        }
    }
}

/// [versions] 段：快照防抖与缩略图超时
#[derive(Debug, Clone, Deserialize)]
pub struct VersionsSection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_thumbnail_timeout_ms")]
    pub thumbnail_timeout_ms: u64,
    /// 版本 JSON 目录；未设置时只保存在内存
    pub store_dir: Option<PathBuf>,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_thumbnail_timeout_ms() -> u64 {
    5000
}

impl Default for VersionsSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            thumbnail_timeout_ms: default_thumbnail_timeout_ms(),
            store_dir: None,
        }
    }
}

impl VersionsSection {
    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            thumbnail_timeout: Duration::from_millis(self.thumbnail_timeout_ms),
        }
    }
}

/// [workspace] 段：本地执行沙箱
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSection {
    /// 本地沙箱根目录；未设置时使用内存沙箱
    pub root: Option<PathBuf>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_command_timeout_secs() -> u64 {
    120
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            root: None,
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 KILN__* 可覆盖
///
/// 查找顺序：config/default.toml → ../config/default.toml → default.toml（找到第一个即用），
/// 然后是显式传入的 config_path，最后是环境变量。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("KILN")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
