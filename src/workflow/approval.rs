//! 审批闸门
//!
//! 分诊结果 needs_approval=true 时，运行停在 Triaged，引擎把 PendingApproval 交给调用方。
//! 调用方带着 ApprovalDecision 调用 `IncidentPipeline::resume`：Approve 从 Triaged 继续（不重跑分诊），
//! Reject 直接结束。PendingApproval 按值消费，同一次运行最多恢复一次。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::workflow::engine::PipelineRun;
use crate::workflow::types::{ApprovalAction, Incident, PipelinePayload, TriageResult};

/// 调用方给出的审批决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve { approved_by: String },
    Reject { reason: String },
}

impl ApprovalDecision {
    pub fn approve(approved_by: impl Into<String>) -> Self {
        ApprovalDecision::Approve {
            approved_by: approved_by.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        ApprovalDecision::Reject {
            reason: reason.into(),
        }
    }
}

/// 已批准动作的记录，写入阶段 2 提示与最终报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRecord {
    pub action: ApprovalAction,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// 等待审批的运行
#[derive(Debug)]
pub struct PendingApproval {
    pub(crate) run: PipelineRun,
    triage: TriageResult,
    action: ApprovalAction,
}

impl PendingApproval {
    pub(crate) fn new(run: PipelineRun, triage: TriageResult, action: ApprovalAction) -> Self {
        Self {
            run,
            triage,
            action,
        }
    }

    pub(crate) fn into_parts(self) -> (PipelineRun, TriageResult, ApprovalAction) {
        (self.run, self.triage, self.action)
    }

    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    /// 等待批准的危险动作
    pub fn action(&self) -> ApprovalAction {
        self.action
    }

    pub fn incident(&self) -> &Incident {
        &self.run.payload.incident
    }

    /// 触发闸门的分诊结果
    pub fn triage(&self) -> &TriageResult {
        &self.triage
    }

    pub fn payload(&self) -> &PipelinePayload {
        &self.run.payload
    }
}
