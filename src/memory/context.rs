//! 上下文记忆：跨运行共享的软提示
//!
//! 记住偏好语言、最近一次的客户与服务。每次委托前 `prepare` 生成常驻指令，
//! 委托后 `record` 从 User 消息中抽取 `customer: X` / `service: X` 并覆盖旧值。
//! 句柄可廉价 clone，内部用 RwLock 保证读改写互斥；并发运行之间读到旧值是可接受的，
//! 因为这里只提供提示，不参与正确性判断。

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::memory::Message;

pub const DEFAULT_LANGUAGE: &str = "hebrew";

static CUSTOMER_RE: OnceLock<Regex> = OnceLock::new();
static SERVICE_RE: OnceLock<Regex> = OnceLock::new();

fn customer_re() -> &'static Regex {
    CUSTOMER_RE.get_or_init(|| {
        Regex::new(r"[Cc]ustomer[:\t ]+([A-Za-z0-9_-]+)").expect("customer pattern is valid")
    })
}

fn service_re() -> &'static Regex {
    SERVICE_RE.get_or_init(|| {
        Regex::new(r"[Ss]ervice[:\t ]+([A-Za-z0-9_-]+)").expect("service pattern is valid")
    })
}

/// 记忆状态的只读快照（诊断与外部持久化用）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub preferred_language: String,
    pub last_customer: Option<String>,
    pub last_service: Option<String>,
}

impl Default for MemorySnapshot {
    fn default() -> Self {
        Self {
            preferred_language: DEFAULT_LANGUAGE.to_string(),
            last_customer: None,
            last_service: None,
        }
    }
}

impl MemorySnapshot {
    /// 拼接常驻指令：语言指令 + 最近服务 + 最近客户，空格分隔；无内容时返回 None
    pub fn instructions(&self) -> Option<String> {
        let mut parts = Vec::new();

        let language = self.preferred_language.trim();
        if language.eq_ignore_ascii_case(DEFAULT_LANGUAGE) {
            parts.push(
                "Respond in Hebrew when addressing the customer. Keep technical terms in English."
                    .to_string(),
            );
        } else if !language.is_empty() {
            parts.push(format!("Respond in {}. Keep answers concise.", language));
        }

        if let Some(service) = &self.last_service {
            parts.push(format!(
                "Context: Previous interaction involved service '{}'.",
                service
            ));
        }
        if let Some(customer) = &self.last_customer {
            parts.push(format!("Context: Previous customer was '{}'.", customer));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// 共享上下文记忆句柄
#[derive(Clone, Debug, Default)]
pub struct ContextMemory {
    state: Arc<RwLock<MemorySnapshot>>,
}

impl ContextMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(language: impl Into<String>) -> Self {
        Self::from_snapshot(MemorySnapshot {
            preferred_language: language.into(),
            ..MemorySnapshot::default()
        })
    }

    /// 从外部持久化的快照恢复
    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// 委托前调用：返回应合并进阶段提示的常驻指令
    pub async fn prepare(&self, _pending: &[Message]) -> Option<String> {
        self.state.read().await.instructions()
    }

    /// 委托后调用（无论成功、兜底还是失败）：从 User 消息中抽取客户与服务
    pub async fn record(&self, messages: &[Message]) {
        let text = messages
            .iter()
            .filter(|m| m.is_user())
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let customer = capture(customer_re(), &text);
        let service = capture(service_re(), &text);
        if customer.is_none() && service.is_none() {
            return;
        }

        let mut state = self.state.write().await;
        if let Some(customer) = customer {
            state.last_customer = Some(customer);
        }
        if let Some(service) = service {
            state.last_service = Some(service);
        }
        tracing::debug!(
            last_customer = ?state.last_customer,
            last_service = ?state.last_service,
            "context memory updated"
        );
    }

    pub async fn set_language(&self, language: impl Into<String>) {
        self.state.write().await.preferred_language = language.into();
    }

    /// 清空客户与服务，保留语言偏好
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.last_customer = None;
        state.last_service = None;
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        self.state.read().await.clone()
    }

    /// 快照的稳定 JSON 编码（字段顺序固定）
    pub async fn serialize(&self) -> String {
        serde_json::to_string(&self.snapshot().await).unwrap_or_else(|_| "{}".to_string())
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
