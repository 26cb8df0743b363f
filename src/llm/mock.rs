//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! 先按顺序消费预设回复队列；队列为空时根据最后一条 User 消息给出固定的分诊 / 方案 JSON，
//! 便于本地跑通整条流水线。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

const TRIAGE_REPLY: &str = r#"{"category": "Incident", "severity": "Sev2", "confidence": 0.82, "next_action": "Check recent deployments and error rates", "needs_approval": false, "approval_action": null}"#;

const SEV1_TRIAGE_REPLY: &str = r#"{"category": "Incident", "severity": "Sev1", "confidence": 0.9, "next_action": "Open a Sev1 bridge and page the service owner", "needs_approval": true, "approval_action": "open_sev1_bridge"}"#;

const PLAN_REPLY: &str = r#"{"summary": "Service is degraded after a recent change; rolling back and monitoring.", "steps": ["Check service logs and error rates", "Roll back the latest deployment", "Restart unhealthy pods", "Monitor latency for 30 minutes"], "customer_message": "We are aware of the issue and are actively working on a fix. We will update you within 30 minutes.", "internal_note": "Correlate with known issues before rolling back; avoid restarting all pods at once."}"#;

/// Mock 客户端：预设回复队列 + 固定回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<Message>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定回复，用完后退回固定回复
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// 已被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 最近一次调用收到的消息
    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn canned_reply(messages: &[Message]) -> &'static str {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if last_user.contains("Please triage") {
            if last_user.contains("Severity Hint: Sev1") {
                SEV1_TRIAGE_REPLY
            } else {
                TRIAGE_REPLY
            }
        } else {
            PLAN_REPLY
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }

        let scripted = self
            .replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        Ok(scripted.unwrap_or_else(|| Self::canned_reply(messages).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{FinalPlan, TriageResult};

    #[tokio::test]
    async fn test_scripted_replies_come_first() {
        let llm = MockLlmClient::with_replies(["one", "two"]);
        let messages = [Message::user("Please triage the following incident")];
        assert_eq!(llm.complete(&messages).await.unwrap(), "one");
        assert_eq!(llm.complete(&messages).await.unwrap(), "two");
        let canned = llm.complete(&messages).await.unwrap();
        assert!(serde_json::from_str::<TriageResult>(&canned).is_ok());
        assert_eq!(llm.calls(), 3);
        assert_eq!(llm.last_messages(), messages.to_vec());
    }

    #[tokio::test]
    async fn test_canned_replies_match_stage() {
        let llm = MockLlmClient::new();

        let sev1 = llm
            .complete(&[Message::user("Please triage the following incident:\nSeverity Hint: Sev1")])
            .await
            .unwrap();
        let triage: TriageResult = serde_json::from_str(&sev1).unwrap();
        assert!(triage.needs_approval);
        assert!(triage.approval_action.is_some());

        let plan = llm
            .complete(&[Message::user("Create an incident response plan based on the following:")])
            .await
            .unwrap();
        let plan: FinalPlan = serde_json::from_str(&plan).unwrap();
        assert_eq!(plan.steps.len(), 4);
    }
}
