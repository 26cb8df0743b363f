//! 流水线错误类型
//!
//! 只有「委托边界」上的失败（推理协作方调用失败、超时、取消、补全查询失败）会成为 PipelineError 并向调用方传播；
//! 阶段输出格式错误由 Result Parser 吸收为兜底值，不在此列。等待审批也不是错误，见 `RunOutcome::AwaitingApproval`。

use std::time::Duration;

use thiserror::Error;

/// 一次流水线运行中不可恢复的错误；出现后运行进入 Failed 状态
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// 推理协作方调用本身失败（网络、鉴权、后端错误等）
    #[error("Delegation failed in stage '{stage}': {message}")]
    Delegation { stage: String, message: String },

    #[error("Delegation timed out in stage '{stage}' after {timeout:?}")]
    DelegationTimeout { stage: String, timeout: Duration },

    /// 补全查询（health / runbook / known issues）失败
    #[error("Lookup '{tool}' failed: {message}")]
    LookupFailed { tool: String, message: String },

    #[error("Lookup '{tool}' timed out after {timeout:?}")]
    LookupTimeout { tool: String, timeout: Duration },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 调用方通过 CancellationToken 取消了运行
    #[error("Pipeline run cancelled during '{0}'")]
    Cancelled(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfiguration(String),
}

impl PipelineError {
    /// 是否为超时类错误（委托或查询）
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PipelineError::DelegationTimeout { .. } | PipelineError::LookupTimeout { .. }
        )
    }
}
