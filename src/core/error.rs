//! 管线错误类型
//!
//! 解析器本身不产生错误（不完整标签缓冲、畸形 Action 抑制）；这里定义的是与外部协作者交互时的错误：
//! 执行沙箱（ExecutorError）、持久化（PersistenceError）、版本快照（VersionError）、模型传输（ModelError）。

use thiserror::Error;

/// 执行沙箱返回的错误（超时、路径逃逸、危险命令、I/O）
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Command timed out after {0}s")]
    Timeout(u64),

    #[error("Forbidden pattern: {0}")]
    Forbidden(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Empty command")]
    EmptyCommand,

    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 持久化层错误（版本存储、自动修复设置）
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// 版本快照错误：读取文件树失败或持久化失败
#[derive(Error, Debug)]
pub enum VersionError {
    #[error("File tree unavailable: {0}")]
    FileTree(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Unknown version: {0}")]
    UnknownVersion(String),
}

/// 模型客户端错误（传输层，由外部 Provider 抽象给出）
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model stream interrupted: {0}")]
    Stream(String),
}
