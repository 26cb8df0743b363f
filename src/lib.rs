//! OpsCopilot - Rust 事件响应编排流水线
//!
//! 模块划分：
//! - **agent**: 根据配置组装流水线（LLM 后端、记忆、拦截器、工具）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 流水线错误与状态机
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 消息类型与跨运行共享的上下文记忆
//! - **middleware**: 阶段与工具调用的埋点拦截器（日志、计时）
//! - **observability**: tracing 订阅器初始化
//! - **report**: 最终报告渲染
//! - **tools**: 补全查询工具、注册表与执行器
//! - **workflow**: 结果解析、审批闸门、流水线引擎

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod middleware;
pub mod observability;
pub mod report;
pub mod tools;
pub mod workflow;

pub use crate::core::{PipelineError, PipelineState};
pub use report::render_report;
pub use workflow::{
    ApprovalDecision, Incident, IncidentPipeline, PendingApproval, PipelineBuilder, RunOutcome,
    RunReport,
};
