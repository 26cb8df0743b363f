//! 流水线类型定义
//!
//! Incident 输入、两个阶段的类型化结果（TriageResult / FinalPlan）、补全数据与贯穿整条链路的 Payload。

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 事件分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Category {
    Incident,
    Question,
    Change,
    Security,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Incident => "Incident",
            Category::Question => "Question",
            Category::Change => "Change",
            Category::Security => "Security",
        };
        f.write_str(name)
    }
}

/// 严重级别：Sev1 最高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
    Sev1,
    Sev2,
    Sev3,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Sev1 => "Sev1",
            Severity::Sev2 => "Sev2",
            Severity::Sev3 => "Sev3",
        };
        f.write_str(name)
    }
}

/// 需要人工审批的危险动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ApprovalAction {
    #[serde(rename = "restart_service")]
    RestartService,
    #[serde(rename = "open_sev1_bridge")]
    OpenSev1Bridge,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::RestartService => "restart_service",
            ApprovalAction::OpenSev1Bridge => "open_sev1_bridge",
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 输入事件：由调用方创建，整个运行期间不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub service: String,
    pub customer: String,
    #[serde(default)]
    pub severity_hint: Option<Severity>,
}

/// 阶段 1（分诊）的类型化结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TriageResult {
    pub category: Category,
    pub severity: Severity,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    pub next_action: String,
    pub needs_approval: bool,
    #[serde(default)]
    pub approval_action: Option<ApprovalAction>,
}

impl TriageResult {
    /// 解析失败时使用的兜底分诊结果
    pub fn fallback() -> Self {
        Self {
            category: Category::Incident,
            severity: Severity::Sev2,
            confidence: 0.5,
            next_action: "Manual review required".to_string(),
            needs_approval: false,
            approval_action: None,
        }
    }
}

/// 补全数据：只在构造阶段 2 提示时使用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub service_health: String,
    pub runbook: String,
    pub known_issues: String,
}

/// 阶段 2（方案撰写）的类型化结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FinalPlan {
    /// 1-2 句话的概述
    pub summary: String,
    /// 有序处置步骤（通常 3-6 条，不强制）
    pub steps: Vec<String>,
    pub customer_message: String,
    pub internal_note: String,
}

impl FinalPlan {
    pub fn fallback() -> Self {
        Self {
            summary: "Plan parsing failed - manual review required".to_string(),
            steps: vec![
                "Review incident manually".to_string(),
                "Contact on-call engineer".to_string(),
            ],
            customer_message: "We are investigating your issue and will update you shortly."
                .to_string(),
            internal_note: "Auto-plan failed".to_string(),
        }
    }
}

/// 贯穿流水线的累加器：逐步填充，从不回滚；只属于一次运行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelinePayload {
    pub incident: Incident,
    pub triage: Option<TriageResult>,
    pub enrichment: Option<Enrichment>,
    pub plan: Option<FinalPlan>,
}

impl PipelinePayload {
    pub fn new(incident: Incident) -> Self {
        Self {
            incident,
            triage: None,
            enrichment: None,
            plan: None,
        }
    }
}

/// 推理阶段标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    /// 阶段 1：分类 / 分诊
    Triage,
    /// 阶段 2：撰写处置方案
    Plan,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Triage => "triage",
            StageKind::Plan => "plan",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
