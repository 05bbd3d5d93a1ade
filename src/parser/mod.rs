//! 解析层：从 Token 流中增量提取 Artifact 与 Action

pub mod events;
pub mod streaming;
pub mod tags;
pub mod types;

pub use events::ParserEvent;
pub use streaming::{ParserOptions, ScanState, StreamingParser};
pub use types::{
    Action, ActionKind, Artifact, ArtifactHeader, MalformedAction, SupabaseOperation, TaskStatus,
};
