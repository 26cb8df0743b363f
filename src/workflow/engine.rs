//! 流水线引擎
//!
//! 把一次事件运行组织成线性状态机：Started → Triaged →（审批闸门）→ Enriched → Planned → Formatted。
//! 每次推理委托前后都会调用上下文记忆（prepare / record），委托本身包在拦截器链里，
//! 超时与取消在拦截器内部判定，所以这类失败同样会留下错误埋点。
//! 格式错误由 Result Parser 吸收；只有委托边界的失败会让运行进入 Failed 并返回给调用方。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::{PipelineError, PipelineState};
use crate::memory::{ContextMemory, Message};
use crate::middleware::{InterceptorChain, InvocationContext};
use crate::report::render_report;
use crate::tools::{ToolExecutor, FETCH_SERVICE_HEALTH, LOOKUP_RUNBOOK, SEARCH_KNOWN_ISSUES};
use crate::workflow::approval::{ApprovalDecision, ApprovalRecord, PendingApproval};
use crate::workflow::collaborator::{OutputContract, ReasoningCollaborator, StageRequest};
use crate::workflow::parser::{parse_or_fallback, StageOutput, StageResult};
use crate::workflow::prompts;
use crate::workflow::types::{
    ApprovalAction, Enrichment, FinalPlan, Incident, PipelinePayload, StageKind, TriageResult,
};

/// 某个阶段使用了兜底结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFallback {
    pub stage: StageKind,
    pub reason: String,
}

/// 成功完成的运行
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// 渲染后的最终报告
    pub report: String,
    pub payload: PipelinePayload,
    /// 依次经历的状态
    pub history: Vec<PipelineState>,
    pub fallbacks: Vec<StageFallback>,
    pub approval: Option<ApprovalRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn plan(&self) -> Option<&FinalPlan> {
        self.payload.plan.as_ref()
    }

    /// 是否有阶段退回到兜底结果
    pub fn used_fallback(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}

/// 一次运行（或一次恢复）的结果
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// 停在审批闸门，等待调用方决定
    AwaitingApproval(PendingApproval),
    /// 调用方拒绝了危险动作
    Rejected {
        run_id: String,
        action: ApprovalAction,
        reason: String,
    },
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// 单次运行的内部状态；只属于这一次运行
#[derive(Debug)]
pub(crate) struct PipelineRun {
    pub(crate) run_id: String,
    pub(crate) state: PipelineState,
    pub(crate) history: Vec<PipelineState>,
    pub(crate) payload: PipelinePayload,
    pub(crate) fallbacks: Vec<StageFallback>,
    pub(crate) approval: Option<ApprovalRecord>,
    pub(crate) started_at: DateTime<Utc>,
}

impl PipelineRun {
    fn start(incident: Incident) -> Self {
        Self {
            run_id: format!("run_{}", uuid::Uuid::new_v4()),
            state: PipelineState::Started,
            history: vec![PipelineState::Started],
            payload: PipelinePayload::new(incident),
            fallbacks: Vec::new(),
            approval: None,
            started_at: Utc::now(),
        }
    }

    fn advance(&mut self, to: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid transition {} -> {}",
            self.state,
            to
        );
        tracing::info!(run_id = %self.run_id, from = %self.state, to = %to, "Pipeline transition");
        self.state = to;
        self.history.push(to);
    }

    /// 进入 Failed 并把错误交还给调用方；payload 随运行一起丢弃
    fn fail(mut self, err: PipelineError) -> PipelineError {
        self.advance(PipelineState::Failed);
        tracing::error!(run_id = %self.run_id, error = %err, "Pipeline run failed");
        err
    }

    fn finish(self, report: String) -> RunReport {
        RunReport {
            run_id: self.run_id,
            report,
            payload: self.payload,
            history: self.history,
            fallbacks: self.fallbacks,
            approval: self.approval,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// 事件响应流水线；`&self` 可被多个运行并发使用
pub struct IncidentPipeline {
    collaborator: Arc<dyn ReasoningCollaborator>,
    tools: ToolExecutor,
    memory: ContextMemory,
    interceptors: InterceptorChain,
    delegation_timeout: Duration,
}

impl IncidentPipeline {
    pub(crate) fn new(
        collaborator: Arc<dyn ReasoningCollaborator>,
        tools: ToolExecutor,
        memory: ContextMemory,
        interceptors: InterceptorChain,
        delegation_timeout: Duration,
    ) -> Self {
        Self {
            collaborator,
            tools,
            memory,
            interceptors,
            delegation_timeout,
        }
    }

    pub fn memory(&self) -> &ContextMemory {
        &self.memory
    }

    pub fn delegation_timeout(&self) -> Duration {
        self.delegation_timeout
    }

    /// 运行入口
    pub async fn run(&self, incident: Incident) -> Result<RunOutcome, PipelineError> {
        self.run_cancellable(incident, CancellationToken::new()).await
    }

    pub async fn run_cancellable(
        &self,
        incident: Incident,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let mut run = PipelineRun::start(incident);
        tracing::info!(
            run_id = %run.run_id,
            incident = %run.payload.incident.id,
            service = %run.payload.incident.service,
            "Pipeline run started"
        );

        let messages = prompts::triage_messages(&run.payload.incident);
        let triaged = self
            .reason::<TriageResult>(&mut run, StageKind::Triage, messages, &cancel)
            .await;
        let triage = match triaged {
            Ok(triage) => triage,
            Err(e) => return Err(run.fail(e)),
        };
        run.payload.triage = Some(triage.clone());
        run.advance(PipelineState::Triaged);

        if triage.needs_approval {
            if let Some(action) = triage.approval_action {
                tracing::warn!(
                    run_id = %run.run_id,
                    action = %action,
                    "Approval required, halting before enrichment"
                );
                return Ok(RunOutcome::AwaitingApproval(PendingApproval::new(
                    run, triage, action,
                )));
            }
        }

        self.plan_and_format(run, triage, &cancel).await
    }

    /// 审批后恢复：Approve 从 Triaged 继续，Reject 结束运行
    pub async fn resume(
        &self,
        pending: PendingApproval,
        decision: ApprovalDecision,
    ) -> Result<RunOutcome, PipelineError> {
        self.resume_cancellable(pending, decision, CancellationToken::new())
            .await
    }

    pub async fn resume_cancellable(
        &self,
        pending: PendingApproval,
        decision: ApprovalDecision,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let (mut run, triage, action) = pending.into_parts();
        match decision {
            ApprovalDecision::Approve { approved_by } => {
                tracing::info!(
                    run_id = %run.run_id,
                    action = %action,
                    approved_by = %approved_by,
                    "Approval granted, resuming"
                );
                run.approval = Some(ApprovalRecord {
                    action,
                    approved_by,
                    approved_at: Utc::now(),
                });
                self.plan_and_format(run, triage, &cancel).await
            }
            ApprovalDecision::Reject { reason } => {
                tracing::warn!(
                    run_id = %run.run_id,
                    action = %action,
                    reason = %reason,
                    "Approval rejected, run aborted"
                );
                Ok(RunOutcome::Rejected {
                    run_id: run.run_id,
                    action,
                    reason,
                })
            }
        }
    }

    /// Triaged 之后的部分：补全 → 撰写方案 → 渲染报告
    async fn plan_and_format(
        &self,
        mut run: PipelineRun,
        triage: TriageResult,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let gathered = self
            .gather_enrichment(&run.run_id, &run.payload.incident, &triage, cancel)
            .await;
        let enrichment = match gathered {
            Ok(enrichment) => enrichment,
            Err(e) => return Err(run.fail(e)),
        };
        let messages = prompts::plan_messages(
            &run.payload.incident,
            &triage,
            &enrichment,
            run.approval.as_ref(),
        );
        run.payload.enrichment = Some(enrichment);
        run.advance(PipelineState::Enriched);

        let planned = self
            .reason::<FinalPlan>(&mut run, StageKind::Plan, messages, cancel)
            .await;
        let plan = match planned {
            Ok(plan) => plan,
            Err(e) => return Err(run.fail(e)),
        };
        let report = render_report(&plan);
        run.payload.plan = Some(plan);
        run.advance(PipelineState::Planned);

        run.advance(PipelineState::Formatted);
        tracing::info!(
            run_id = %run.run_id,
            fallbacks = run.fallbacks.len(),
            "Pipeline run completed"
        );
        Ok(RunOutcome::Completed(run.finish(report)))
    }

    /// 一个推理阶段：prepare → 委托（拦截器 + 超时 + 取消）→ record → 解析（失败则兜底）
    async fn reason<T: StageResult>(
        &self,
        run: &mut PipelineRun,
        stage: StageKind,
        mut messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<T, PipelineError> {
        if let Some(instructions) = self.memory.prepare(&messages).await {
            prompts::insert_context(&mut messages, instructions);
        }

        let request = StageRequest {
            run_id: run.run_id.clone(),
            stage,
            messages,
            contract: OutputContract::of::<T>(),
        };
        let ctx = InvocationContext::stage(&run.run_id, stage.as_str(), &request.messages);
        let delegated = self
            .interceptors
            .run(&ctx, || self.delegate(&request, cancel))
            .await;

        // 无论成功与否都要更新记忆
        self.memory.record(&request.messages).await;
        let output = delegated?;

        let (value, error) = parse_or_fallback::<T>(output);
        if let Some(error) = error {
            run.fallbacks.push(StageFallback {
                stage,
                reason: error.to_string(),
            });
        }
        Ok(value)
    }

    async fn delegate(
        &self,
        request: &StageRequest,
        cancel: &CancellationToken,
    ) -> Result<StageOutput, PipelineError> {
        let stage = request.stage.to_string();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled(stage)),
            result = timeout(self.delegation_timeout, self.collaborator.delegate(request)) => {
                match result {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(message)) => Err(PipelineError::Delegation { stage, message }),
                    Err(_) => Err(PipelineError::DelegationTimeout {
                        stage,
                        timeout: self.delegation_timeout,
                    }),
                }
            }
        }
    }

    /// 三个补全查询互相独立，一起等待。任一查询失败时取消其余查询，
    /// 每个查询都会以 after 或 on_failure 结束自己的埋点
    async fn gather_enrichment(
        &self,
        run_id: &str,
        incident: &Incident,
        triage: &TriageResult,
        cancel: &CancellationToken,
    ) -> Result<Enrichment, PipelineError> {
        let service = incident.service.as_str();
        let siblings = cancel.child_token();
        let (service_health, runbook, known_issues) = futures_util::future::join3(
            self.lookup(
                run_id,
                FETCH_SERVICE_HEALTH,
                json!({ "service": service }),
                &siblings,
            ),
            self.lookup(
                run_id,
                LOOKUP_RUNBOOK,
                json!({ "service": service, "category": triage.category.to_string() }),
                &siblings,
            ),
            self.lookup(
                run_id,
                SEARCH_KNOWN_ISSUES,
                json!({ "service": service, "query": triage.next_action }),
                &siblings,
            ),
        )
        .await;

        match (service_health, runbook, known_issues) {
            (Ok(service_health), Ok(runbook), Ok(known_issues)) => Ok(Enrichment {
                service_health,
                runbook,
                known_issues,
            }),
            _ if cancel.is_cancelled() => {
                Err(PipelineError::Cancelled("enrichment".to_string()))
            }
            (health, runbook, issues) => {
                // 被兄弟查询连带取消的不算根因
                let cause = [health.err(), runbook.err(), issues.err()]
                    .into_iter()
                    .flatten()
                    .find(|e| !matches!(e, PipelineError::Cancelled(_)))
                    .unwrap_or_else(|| PipelineError::Cancelled("enrichment".to_string()));
                Err(cause)
            }
        }
    }

    async fn lookup(
        &self,
        run_id: &str,
        tool: &str,
        args: serde_json::Value,
        siblings: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let result = self.tools.execute(run_id, tool, args, siblings).await;
        if result.is_err() {
            siblings.cancel();
        }
        result
    }
}
