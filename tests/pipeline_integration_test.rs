//! 流水线集成测试：用脚本化协作方驱动公开 API

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use opscopilot::core::{PipelineError, PipelineState};
use opscopilot::memory::ContextMemory;
use opscopilot::middleware::TimingInterceptor;
use opscopilot::tools::{
    register_enrichment_tools, OpsCatalog, Tool, ToolRegistry, FETCH_SERVICE_HEALTH,
    LOOKUP_RUNBOOK, SEARCH_KNOWN_ISSUES,
};
use opscopilot::workflow::{
    ApprovalAction, ApprovalDecision, Category, Incident, PipelineBuilder, ReasoningCollaborator,
    RunOutcome, Severity, StageKind, StageOutput, StageRequest, TriageResult,
};

/// 按顺序返回预设输出的协作方，并记录收到的请求
#[derive(Default)]
struct ScriptedCollaborator {
    outputs: Mutex<VecDeque<Result<StageOutput, String>>>,
    requests: Mutex<Vec<StageRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedCollaborator {
    fn new(outputs: Vec<Result<StageOutput, String>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn stages(&self) -> Vec<StageKind> {
        self.requests.lock().unwrap().iter().map(|r| r.stage).collect()
    }

    fn request(&self, index: usize) -> StageRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ReasoningCollaborator for ScriptedCollaborator {
    async fn delegate(&self, request: &StageRequest) -> Result<StageOutput, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}

fn inc1() -> Incident {
    Incident {
        id: "INC-1".into(),
        title: "API down".into(),
        description: "500s on checkout".into(),
        service: "checkout-api".into(),
        customer: "acme".into(),
        severity_hint: None,
    }
}

fn halting_triage() -> Value {
    json!({
        "category": "Incident",
        "severity": "Sev1",
        "confidence": 0.9,
        "next_action": "restart",
        "needs_approval": true,
        "approval_action": "restart_service"
    })
}

fn passing_triage() -> Value {
    json!({
        "category": "Incident",
        "severity": "Sev2",
        "confidence": 0.7,
        "next_action": "investigate",
        "needs_approval": false
    })
}

fn plan() -> Value {
    json!({
        "summary": "Checkout API degraded",
        "steps": ["Check logs", "Restart pods", "Monitor"],
        "customer_message": "We are investigating.",
        "internal_note": "Likely memory leak."
    })
}

#[tokio::test]
async fn test_approval_gate_halts_before_enrichment() {
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![Ok(halting_triage().into())]));
    let timing = TimingInterceptor::new();
    let pipeline = PipelineBuilder::new(collaborator.clone())
        .interceptor(Arc::new(timing.clone()))
        .build()
        .unwrap();

    let outcome = pipeline.run(inc1()).await.unwrap();
    let pending = match outcome {
        RunOutcome::AwaitingApproval(pending) => pending,
        other => panic!("expected approval halt, got {:?}", other),
    };

    assert_eq!(
        pending.triage(),
        &TriageResult {
            category: Category::Incident,
            severity: Severity::Sev1,
            confidence: 0.9,
            next_action: "restart".into(),
            needs_approval: true,
            approval_action: Some(ApprovalAction::RestartService),
        }
    );
    assert_eq!(pending.action(), ApprovalAction::RestartService);
    assert_eq!(pending.incident(), &inc1());
    assert!(pending.payload().enrichment.is_none());
    assert!(pending.payload().plan.is_none());
    assert_eq!(collaborator.calls(), 1);

    // 没有任何补全查询被调用
    let records = timing.records_for(pending.run_id());
    assert_eq!(records.len(), 1);
    assert!(!records[0].tool);
}

#[tokio::test]
async fn test_full_run_renders_report() {
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![
        Ok(passing_triage().into()),
        Ok(plan().into()),
    ]));
    let pipeline = PipelineBuilder::new(collaborator.clone()).build().unwrap();

    let outcome = pipeline.run(inc1()).await.unwrap();
    let report = outcome.report().expect("completed");

    assert!(report.report.contains("Summary: Checkout API degraded"));
    assert!(report.report.contains("  1. Check logs"));
    assert!(report.report.contains("  2. Restart pods"));
    assert!(report.report.contains("  3. Monitor"));
    assert!(report.report.contains("We are investigating."));
    assert!(report.report.contains("Likely memory leak."));
    assert!(!report.used_fallback());
    assert_eq!(
        report.history,
        vec![
            PipelineState::Started,
            PipelineState::Triaged,
            PipelineState::Enriched,
            PipelineState::Planned,
            PipelineState::Formatted,
        ]
    );
    assert_eq!(collaborator.stages(), vec![StageKind::Triage, StageKind::Plan]);

    // 阶段 2 的提示带上了分诊结果与三项补全数据
    let payload = &report.payload;
    let enrichment = payload.enrichment.as_ref().unwrap();
    let plan_prompt = collaborator
        .request(1)
        .messages
        .iter()
        .filter(|m| m.is_user())
        .map(|m| m.content.clone())
        .collect::<String>();
    assert!(plan_prompt.contains("- Recommended Action: investigate"));
    assert!(plan_prompt.contains(&enrichment.service_health));
    assert!(plan_prompt.contains(&enrichment.runbook));
    assert!(plan_prompt.contains(&enrichment.known_issues));
    assert_eq!(report.plan().unwrap().steps.len(), 3);
}

#[tokio::test]
async fn test_malformed_outputs_fall_back_and_complete() {
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![
        Ok(StageOutput::from("I think this is bad")),
        Ok(StageOutput::Sequence(vec![])),
    ]));
    let pipeline = PipelineBuilder::new(collaborator).build().unwrap();

    let outcome = pipeline.run(inc1()).await.unwrap();
    let report = outcome.report().expect("completed");

    assert_eq!(report.payload.triage, Some(TriageResult::fallback()));
    assert_eq!(report.fallbacks.len(), 2);
    assert_eq!(report.fallbacks[0].stage, StageKind::Triage);
    assert_eq!(report.fallbacks[1].stage, StageKind::Plan);
    assert!(report.report.contains("Plan parsing failed - manual review required"));
    assert!(report.report.contains("  2. Contact on-call engineer"));
}

#[tokio::test]
async fn test_delegation_failure_is_propagated_and_observed() {
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![Err("backend unavailable".into())]));
    let timing = TimingInterceptor::new();
    let pipeline = PipelineBuilder::new(collaborator)
        .interceptor(Arc::new(timing.clone()))
        .build()
        .unwrap();

    let err = pipeline.run(inc1()).await.unwrap_err();
    assert_eq!(
        err,
        PipelineError::Delegation {
            stage: "triage".into(),
            message: "backend unavailable".into(),
        }
    );

    let records = timing.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "triage");
    assert!(!records[0].ok);
}

#[tokio::test]
async fn test_delegation_timeout() {
    let collaborator = Arc::new(ScriptedCollaborator::slow(Duration::from_secs(5)));
    let timing = TimingInterceptor::new();
    let pipeline = PipelineBuilder::new(collaborator)
        .interceptor(Arc::new(timing.clone()))
        .delegation_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = pipeline.run(inc1()).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(err, PipelineError::DelegationTimeout { ref stage, .. } if stage == "triage"));
    assert!(!timing.records()[0].ok);
}

#[tokio::test]
async fn test_cancellation_stops_run() {
    let collaborator = Arc::new(ScriptedCollaborator::slow(Duration::from_secs(5)));
    let pipeline = PipelineBuilder::new(collaborator).build().unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = pipeline.run_cancellable(inc1(), cancel).await.unwrap_err();
    assert_eq!(err, PipelineError::Cancelled("triage".into()));
}

#[tokio::test]
async fn test_resume_after_approval_skips_triage() {
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![
        Ok(halting_triage().into()),
        Ok(plan().into()),
    ]));
    let pipeline = PipelineBuilder::new(collaborator.clone()).build().unwrap();

    let pending = match pipeline.run(inc1()).await.unwrap() {
        RunOutcome::AwaitingApproval(pending) => pending,
        other => panic!("expected approval halt, got {:?}", other),
    };
    let run_id = pending.run_id().to_string();

    let outcome = pipeline
        .resume(pending, ApprovalDecision::approve("oncall@example.com"))
        .await
        .unwrap();
    let report = outcome.report().expect("completed");

    assert_eq!(report.run_id, run_id);
    assert_eq!(collaborator.stages(), vec![StageKind::Triage, StageKind::Plan]);
    let approval = report.approval.as_ref().unwrap();
    assert_eq!(approval.action, ApprovalAction::RestartService);
    assert_eq!(approval.approved_by, "oncall@example.com");
    assert!(collaborator.request(1).messages.iter().any(|m| m
        .content
        .contains("- Approved Action: restart_service (approved by oncall@example.com)")));
    assert_eq!(report.history.last(), Some(&PipelineState::Formatted));
}

#[tokio::test]
async fn test_resume_with_rejection_ends_run() {
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![Ok(halting_triage().into())]));
    let pipeline = PipelineBuilder::new(collaborator.clone()).build().unwrap();

    let pending = match pipeline.run(inc1()).await.unwrap() {
        RunOutcome::AwaitingApproval(pending) => pending,
        other => panic!("expected approval halt, got {:?}", other),
    };

    let outcome = pipeline
        .resume(pending, ApprovalDecision::reject("not during peak hours"))
        .await
        .unwrap();
    match outcome {
        RunOutcome::Rejected { action, reason, .. } => {
            assert_eq!(action, ApprovalAction::RestartService);
            assert_eq!(reason, "not during peak hours");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(collaborator.calls(), 1);
}

#[tokio::test]
async fn test_memory_carries_context_into_next_run() {
    let memory = ContextMemory::new();
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![
        Ok(passing_triage().into()),
        Ok(plan().into()),
        Ok(passing_triage().into()),
        Ok(plan().into()),
    ]));
    let pipeline = PipelineBuilder::new(collaborator.clone())
        .memory(memory.clone())
        .build()
        .unwrap();

    pipeline.run(inc1()).await.unwrap();
    let snapshot = memory.snapshot().await;
    assert_eq!(snapshot.last_customer.as_deref(), Some("acme"));
    assert_eq!(snapshot.last_service.as_deref(), Some("checkout-api"));

    // 第二次运行的第一个请求已经带上了上一次记住的服务与客户
    pipeline.run(inc1()).await.unwrap();
    let context: String = collaborator
        .request(2)
        .messages
        .iter()
        .filter(|m| !m.is_user())
        .map(|m| m.content.clone())
        .collect();
    assert!(context.contains("Respond in Hebrew"));
    assert!(context.contains("checkout-api"));
    assert!(context.contains("acme"));
}

#[tokio::test]
async fn test_memory_is_updated_even_when_delegation_fails() {
    let memory = ContextMemory::with_language("english");
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![Err("boom".into())]));
    let pipeline = PipelineBuilder::new(collaborator)
        .memory(memory.clone())
        .build()
        .unwrap();

    assert!(pipeline.run(inc1()).await.is_err());
    assert_eq!(memory.snapshot().await.last_service.as_deref(), Some("checkout-api"));
}

struct FailingLookup;

#[async_trait]
impl Tool for FailingLookup {
    fn name(&self) -> &str {
        SEARCH_KNOWN_ISSUES
    }

    fn description(&self) -> &str {
        "always fails"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Err("index offline".to_string())
    }
}

#[tokio::test]
async fn test_lookup_failure_fails_run() {
    let mut registry = ToolRegistry::new();
    register_enrichment_tools(&mut registry, Arc::new(OpsCatalog::demo()));
    registry.register(FailingLookup);
    assert!(registry.contains(FETCH_SERVICE_HEALTH));
    assert!(registry.contains(LOOKUP_RUNBOOK));

    let collaborator = Arc::new(ScriptedCollaborator::new(vec![Ok(passing_triage().into())]));
    let pipeline = PipelineBuilder::new(collaborator.clone())
        .tools(registry)
        .build()
        .unwrap();

    let err = pipeline.run(inc1()).await.unwrap_err();
    assert_eq!(
        err,
        PipelineError::LookupFailed {
            tool: SEARCH_KNOWN_ISSUES.into(),
            message: "index offline".into(),
        }
    );
    assert_eq!(collaborator.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let pipeline = Arc::new(
        PipelineBuilder::new(Arc::new(StageAwareCollaborator))
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..4 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let mut incident = inc1();
            incident.id = format!("INC-{}", i);
            pipeline.run(incident).await
        }));
    }

    let mut run_ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        let report = outcome.report().expect("completed").clone();
        assert!(!report.used_fallback());
        run_ids.push(report.run_id.clone());
        assert!(report.payload.incident.id.starts_with("INC-"));
    }
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 4);
}

/// 按阶段返回固定输出，适合并发测试
struct StageAwareCollaborator;

#[async_trait]
impl ReasoningCollaborator for StageAwareCollaborator {
    async fn delegate(&self, request: &StageRequest) -> Result<StageOutput, String> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(match request.stage {
            StageKind::Triage => passing_triage().into(),
            StageKind::Plan => plan().into(),
        })
    }
}

/// 长时间不返回的健康查询
struct StalledHealth;

#[async_trait]
impl Tool for StalledHealth {
    fn name(&self) -> &str {
        FETCH_SERVICE_HEALTH
    }

    fn description(&self) -> &str {
        "never answers in time"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("late".to_string())
    }
}

fn stalled_health_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_enrichment_tools(&mut registry, Arc::new(OpsCatalog::demo()));
    registry.register(StalledHealth);
    registry
}

#[tokio::test]
async fn test_cancel_during_enrichment_closes_open_lookups() {
    let collaborator = Arc::new(ScriptedCollaborator::new(vec![Ok(passing_triage().into())]));
    let timing = TimingInterceptor::new();
    let pipeline = PipelineBuilder::new(collaborator)
        .tools(stalled_health_registry())
        .interceptor(Arc::new(timing.clone()))
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = pipeline.run_cancellable(inc1(), cancel).await.unwrap_err();
    assert_eq!(err, PipelineError::Cancelled("enrichment".into()));

    let records = timing.records();
    let health: Vec<_> = records
        .iter()
        .filter(|r| r.tool && r.name == FETCH_SERVICE_HEALTH)
        .collect();
    assert_eq!(health.len(), 1);
    assert!(!health[0].ok);
    // 另外两个查询已正常结束
    assert_eq!(records.iter().filter(|r| r.tool).count(), 3);
}

#[tokio::test]
async fn test_failed_lookup_cancels_slow_sibling() {
    let mut registry = stalled_health_registry();
    registry.register(FailingLookup);

    let collaborator = Arc::new(ScriptedCollaborator::new(vec![Ok(passing_triage().into())]));
    let timing = TimingInterceptor::new();
    let pipeline = PipelineBuilder::new(collaborator)
        .tools(registry)
        .interceptor(Arc::new(timing.clone()))
        .build()
        .unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), pipeline.run(inc1()))
        .await
        .expect("sibling lookups should stop once one fails")
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::LookupFailed {
            tool: SEARCH_KNOWN_ISSUES.into(),
            message: "index offline".into(),
        }
    );

    let records = timing.records();
    let health = records
        .iter()
        .find(|r| r.tool && r.name == FETCH_SERVICE_HEALTH)
        .expect("health lookup recorded");
    assert!(!health.ok);
    assert_eq!(records.iter().filter(|r| r.tool).count(), 3);
}
