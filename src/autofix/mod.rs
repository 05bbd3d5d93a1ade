//! 自动修复：运行时错误 → 有界重试 → 新的模型提示

pub mod controller;
pub mod prompt;
pub mod types;

pub use controller::{AutoFixController, PendingDelay};
pub use prompt::build_fix_prompt;
pub use types::{AutoFixSettings, AutoFixStatus, ErrorContext, ErrorSource, FixAttempt};
