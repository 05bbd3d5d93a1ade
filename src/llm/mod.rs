//! 模型层：客户端抽象与脚本化实现

pub mod mock;
pub mod traits;

pub use mock::{chunk_text, ScriptedModel};
pub use traits::{ModelClient, TokenStream};
