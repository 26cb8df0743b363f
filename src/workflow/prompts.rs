//! 阶段提示构造
//!
//! 每个推理阶段的提示 = System（角色指令）+ 可选 System（上下文记忆）+ User（事件正文与字段要求）。
//! User 正文里先写 Service / Customer 行，便于上下文记忆抽取到的是事件本身的值。

use crate::memory::Message;
use crate::workflow::approval::ApprovalRecord;
use crate::workflow::types::{Enrichment, Incident, TriageResult};

pub const CLASSIFIER_INSTRUCTIONS: &str = r#"You are an incident classifier for a cloud operations team.

For every incident decide:
1. Category: Incident, Question, Change or Security
2. Severity: Sev1 (customer-facing outage, data loss risk, security breach), Sev2 (degraded performance, partial outage), Sev3 (minor issue, question, planned change)
3. Confidence in your classification, between 0.0 and 1.0
4. The next action the on-call engineer should take
5. Whether that action is dangerous and needs human approval first

Set needs_approval=true and name the approval_action when the next action restarts a production service ("restart_service") or requires opening a Sev1 bridge call ("open_sev1_bridge").
Always answer with valid JSON for the TriageResult shape."#;

pub const WRITER_INSTRUCTIONS: &str = r#"You are a technical writer for a cloud operations team.

Turn a triaged incident and its enrichment data into a response plan:
1. Summary: one or two sentences describing the situation
2. Steps: 3-6 specific, actionable steps in execution order
3. Customer message: empathetic and informative, in the customer's language if the context says so
4. Internal note: technical details, risks and caveats for the ops team

Always answer with valid JSON for the FinalPlan shape."#;

/// 把上下文记忆指令作为 System 消息插到第一条 User 消息之前
pub fn insert_context(messages: &mut Vec<Message>, instructions: String) {
    let pos = messages
        .iter()
        .position(|m| m.is_user())
        .unwrap_or(messages.len());
    messages.insert(pos, Message::system(instructions));
}

/// 阶段 1：分诊
pub fn triage_messages(incident: &Incident) -> Vec<Message> {
    let severity_hint = incident
        .severity_hint
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Not provided".to_string());

    let prompt = format!(
        r#"Please triage the following incident:

ID: {id}
Service: {service}
Customer: {customer}
Severity Hint: {severity_hint}
Title: {title}
Description: {description}

Classify this incident and determine the appropriate response.

Return a valid JSON object with exactly these fields:
- category: one of "Incident", "Question", "Change", "Security"
- severity: one of "Sev1", "Sev2", "Sev3"
- confidence: a number between 0.0 and 1.0
- next_action: string describing the recommended action
- needs_approval: boolean (true if a dangerous action is needed)
- approval_action: null or one of "restart_service", "open_sev1_bridge"
"#,
        id = incident.id,
        service = incident.service,
        customer = incident.customer,
        severity_hint = severity_hint,
        title = incident.title,
        description = incident.description,
    );

    vec![Message::system(CLASSIFIER_INSTRUCTIONS), Message::user(prompt)]
}

/// 阶段 2：基于分诊结果与补全数据撰写处置方案
pub fn plan_messages(
    incident: &Incident,
    triage: &TriageResult,
    enrichment: &Enrichment,
    approval: Option<&ApprovalRecord>,
) -> Vec<Message> {
    let approval_line = match approval {
        Some(record) => format!(
            "- Approved Action: {} (approved by {})\n",
            record.action, record.approved_by
        ),
        None => String::new(),
    };

    let prompt = format!(
        r#"Create an incident response plan based on the following:

## Incident
- ID: {id}
- Service: {service}
- Customer: {customer}
- Title: {title}
- Description: {description}

## Triage Result
- Category: {category}
- Severity: {severity}
- Confidence: {confidence}
- Recommended Action: {next_action}
- Needs Approval: {needs_approval}
{approval_line}
## Enrichment Data
### Health
{health}

### Runbook
{runbook}

### Known Issues
{known_issues}

Return a valid JSON object with exactly these fields:
- summary: 1-2 sentence summary
- steps: array of 3-6 action strings
- customer_message: professional message to the customer
- internal_note: technical notes for the ops team
"#,
        id = incident.id,
        service = incident.service,
        customer = incident.customer,
        title = incident.title,
        description = incident.description,
        category = triage.category,
        severity = triage.severity,
        confidence = triage.confidence,
        next_action = triage.next_action,
        needs_approval = triage.needs_approval,
        approval_line = approval_line,
        health = enrichment.service_health,
        runbook = enrichment.runbook,
        known_issues = enrichment.known_issues,
    );

    vec![Message::system(WRITER_INSTRUCTIONS), Message::user(prompt)]
}
