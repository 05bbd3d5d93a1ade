//! Action 分发：解析器事件 → 执行沙箱
//!
//! - **executor**: 沙箱接口（ActionExecutor / FileTreeSource）与文件树类型
//! - **dispatcher**: 事件分发、命令规范化、失败转 ErrorContext
//! - **memory** / **local**: 内存沙箱与本地目录沙箱

pub mod dispatcher;
pub mod executor;
pub mod local;
pub mod memory;

pub use dispatcher::{ActionDispatcher, DispatchOutcome};
pub use executor::{
    insert_with_parents, ActionExecutor, ExecutableAction, ExecutionOutput, FileEntry, FileMap,
    FileTreeSource, FileType,
};
pub use local::LocalWorkspace;
pub use memory::MemoryWorkspace;
