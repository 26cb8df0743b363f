//! 核心：流水线错误与状态机

pub mod error;
pub mod state;

pub use error::PipelineError;
pub use state::PipelineState;
