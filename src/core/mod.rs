//! 核心层：错误类型、防抖定时器、工作台主控与构建器

pub mod builder;
pub mod error;
pub mod timer;
pub mod workbench;

pub use builder::WorkbenchBuilder;
pub use error::{ExecutorError, ModelError, PersistenceError, VersionError};
pub use timer::DebounceTimers;
pub use workbench::{ChunkReport, FixOutcome, Workbench};
