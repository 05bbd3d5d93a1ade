//! 版本快照：防抖、去重、持久化与回溯
//!
//! - **manager**: VersionSnapshotManager（按 message id 防抖，每条消息至多一个版本）
//! - **store**: VersionStore 契约与内存 / JSON 实现
//! - **thumbnail**: 实时截图 + 确定性合成图兜底
//! - **history**: 从聊天历史重建版本

pub mod history;
pub mod manager;
pub mod store;
pub mod thumbnail;
pub mod types;

pub use history::derive_versions_from_history;
pub use manager::{SnapshotOptions, VersionSnapshotManager};
pub use store::{JsonVersionStore, MemoryVersionStore, VersionStore};
pub use thumbnail::{fallback_thumbnail, ThumbnailCapture};
pub use types::{push_latest, ProjectVersion, VersionEvent};
