//! 记忆层：阶段提示消息与跨运行共享的上下文记忆

pub mod context;
pub mod message;

pub use context::{ContextMemory, MemorySnapshot, DEFAULT_LANGUAGE};
pub use message::{total_chars, Message, Role};
