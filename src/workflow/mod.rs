//! 事件响应流水线：类型、结果解析、推理协作方、审批闸门与引擎

pub mod approval;
pub mod builder;
pub mod collaborator;
pub mod engine;
pub mod parser;
pub mod prompts;
pub mod types;

pub use approval::{ApprovalDecision, ApprovalRecord, PendingApproval};
pub use builder::{PipelineBuilder, DEFAULT_DELEGATION_TIMEOUT, DEFAULT_LOOKUP_TIMEOUT};
pub use collaborator::{LlmCollaborator, OutputContract, ReasoningCollaborator, StageRequest};
pub use engine::{IncidentPipeline, RunOutcome, RunReport, StageFallback};
pub use parser::{
    parse_or_fallback, parse_stage_output, try_parse, ParseError, StageOutput, StageResult,
    TypedResult,
};
pub use types::*;
