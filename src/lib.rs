//! Kiln - 流式 Artifact/Action 管线
//!
//! 模块划分：
//! - **parser**: 从助手回复的 Token 流中增量提取 Artifact 与 Action
//! - **command**: shell 命令改写（不可用的运行时）与修复（npm/yarn 前缀、粘连拆分）
//! - **dispatch**: 把解析事件分发给执行沙箱（内存 / 本地目录）
//! - **autofix**: 运行时错误的有界自动修复
//! - **version**: 防抖去重的版本快照与持久化
//! - **core**: 错误类型、防抖定时器、工作台主控
//! - **llm**: 模型客户端抽象
//! - **memory**: 聊天历史与 JSON 持久化
//! - **config**: 应用配置加载（TOML + 环境变量）

pub mod autofix;
pub mod command;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod parser;
pub mod version;

pub use crate::core::{Workbench, WorkbenchBuilder};
pub use parser::{ParserEvent, StreamingParser};
