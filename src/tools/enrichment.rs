//! 补全查询工具：服务健康、Runbook、已知问题
//!
//! 三个查询彼此独立，数据来自 OpsCatalog（内置一份确定性的演示数据）。
//! 返回文本格式固定，流水线只把它当作不透明上下文拼进提示。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolRegistry};
use crate::workflow::types::Category;

pub const FETCH_SERVICE_HEALTH: &str = "fetch_service_health";
pub const LOOKUP_RUNBOOK: &str = "lookup_runbook";
pub const SEARCH_KNOWN_ISSUES: &str = "search_known_issues";

/// 单个服务的健康指标
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHealth {
    pub status: String,
    pub error_rate_pct: f64,
    pub p95_latency_ms: u64,
    pub last_deploy: String,
}

/// 已知问题条目；keywords 用于与查询词匹配
#[derive(Debug, Clone, PartialEq)]
pub struct KnownIssue {
    pub id: String,
    pub service: String,
    pub title: String,
    pub workaround: String,
    pub keywords: Vec<String>,
}

/// 补全数据源
#[derive(Debug, Clone, Default)]
pub struct OpsCatalog {
    health: HashMap<String, ServiceHealth>,
    runbooks: HashMap<Category, String>,
    known_issues: Vec<KnownIssue>,
}

impl OpsCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_health(mut self, service: impl Into<String>, health: ServiceHealth) -> Self {
        self.health.insert(service.into(), health);
        self
    }

    pub fn with_runbook(mut self, category: Category, text: impl Into<String>) -> Self {
        self.runbooks.insert(category, text.into());
        self
    }

    pub fn with_known_issue(mut self, issue: KnownIssue) -> Self {
        self.known_issues.push(issue);
        self
    }

    /// 演示数据
    pub fn demo() -> Self {
        Self::new()
            .with_health(
                "checkout-api",
                ServiceHealth {
                    status: "degraded".into(),
                    error_rate_pct: 12.5,
                    p95_latency_ms: 2400,
                    last_deploy: "2 hours ago (v2.14.1)".into(),
                },
            )
            .with_health(
                "billing-api",
                ServiceHealth {
                    status: "healthy".into(),
                    error_rate_pct: 0.2,
                    p95_latency_ms: 180,
                    last_deploy: "3 days ago (v5.2.0)".into(),
                },
            )
            .with_health(
                "auth-service",
                ServiceHealth {
                    status: "healthy".into(),
                    error_rate_pct: 0.1,
                    p95_latency_ms: 95,
                    last_deploy: "1 week ago (v1.9.3)".into(),
                },
            )
            .with_runbook(
                Category::Incident,
                "1. Check the service dashboard for error rate and latency\n\
                 2. Inspect recent deploys and roll back if correlated\n\
                 3. Check pod health and restart unhealthy pods (requires approval)\n\
                 4. Escalate to Sev1 bridge if customer impact persists > 15 min",
            )
            .with_runbook(
                Category::Question,
                "1. Search the knowledge base for an existing answer\n\
                 2. Reply to the customer with documentation links\n\
                 3. Create a docs ticket if the answer is missing",
            )
            .with_runbook(
                Category::Change,
                "1. Verify the change request has an approved CAB ticket\n\
                 2. Schedule inside the maintenance window\n\
                 3. Prepare a rollback plan before execution",
            )
            .with_runbook(
                Category::Security,
                "1. Isolate affected resources\n\
                 2. Rotate exposed credentials\n\
                 3. Notify the security on-call and open a Sev1 bridge\n\
                 4. Preserve logs for forensics",
            )
            .with_known_issue(KnownIssue {
                id: "KI-1042".into(),
                service: "checkout-api".into(),
                title: "Memory leak in payment session cache after v2.14.0".into(),
                workaround: "Restart pods every 6 hours until v2.14.2 ships".into(),
                keywords: vec!["500".into(), "memory".into(), "restart".into(), "timeout".into()],
            })
            .with_known_issue(KnownIssue {
                id: "KI-0987".into(),
                service: "checkout-api".into(),
                title: "Intermittent 502 from upstream payment gateway".into(),
                workaround: "Retry with exponential backoff; gateway vendor notified".into(),
                keywords: vec!["502".into(), "gateway".into(), "payment".into()],
            })
            .with_known_issue(KnownIssue {
                id: "KI-1101".into(),
                service: "billing-api".into(),
                title: "Invoice PDF generation slow for large accounts".into(),
                workaround: "Generate asynchronously via the export endpoint".into(),
                keywords: vec!["invoice".into(), "slow".into(), "pdf".into()],
            })
    }

    pub fn service_health(&self, service: &str) -> String {
        match self.health.get(service) {
            Some(h) => format!(
                "Service: {} | Status: {} | Error rate: {:.1}% | p95 latency: {}ms | Last deploy: {}",
                service, h.status, h.error_rate_pct, h.p95_latency_ms, h.last_deploy
            ),
            None => format!("Service: {} | Status: unknown (no telemetry available)", service),
        }
    }

    pub fn runbook(&self, service: &str, category: Category) -> String {
        match self.runbooks.get(&category) {
            Some(text) => format!("Runbook: {} / {}\n{}", service, category, text),
            None => format!(
                "Runbook: {} / {}\nNo runbook found. Follow the generic escalation policy.",
                service, category
            ),
        }
    }

    /// 按服务过滤，再按查询词与 keywords 的交集匹配（大小写不敏感）
    pub fn known_issues(&self, service: &str, query: &str) -> String {
        let words: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let matches: Vec<&KnownIssue> = self
            .known_issues
            .iter()
            .filter(|issue| issue.service == service)
            .filter(|issue| {
                issue
                    .keywords
                    .iter()
                    .any(|k| words.iter().any(|w| w == &k.to_lowercase()))
            })
            .collect();

        if matches.is_empty() {
            return format!("No known issues for {} matching '{}'", service, query);
        }
        matches
            .iter()
            .map(|i| format!("[{}] {} (workaround: {})", i.id, i.title, i.workaround))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing argument: {}", key))
}

pub struct FetchServiceHealthTool {
    catalog: Arc<OpsCatalog>,
}

impl FetchServiceHealthTool {
    pub fn new(catalog: Arc<OpsCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for FetchServiceHealthTool {
    fn name(&self) -> &str {
        FETCH_SERVICE_HEALTH
    }

    fn description(&self) -> &str {
        "Fetch current health metrics for a service. Args: {\"service\": \"name\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let service = required_str(&args, "service")?;
        Ok(self.catalog.service_health(service))
    }
}

pub struct LookupRunbookTool {
    catalog: Arc<OpsCatalog>,
}

impl LookupRunbookTool {
    pub fn new(catalog: Arc<OpsCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for LookupRunbookTool {
    fn name(&self) -> &str {
        LOOKUP_RUNBOOK
    }

    fn description(&self) -> &str {
        "Look up the runbook for a service and incident category. Args: {\"service\": \"name\", \"category\": \"Incident|Question|Change|Security\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let service = required_str(&args, "service")?;
        let category: Category = serde_json::from_value(Value::String(
            required_str(&args, "category")?.to_string(),
        ))
        .map_err(|e| format!("Invalid category: {}", e))?;
        Ok(self.catalog.runbook(service, category))
    }
}

pub struct SearchKnownIssuesTool {
    catalog: Arc<OpsCatalog>,
}

impl SearchKnownIssuesTool {
    pub fn new(catalog: Arc<OpsCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for SearchKnownIssuesTool {
    fn name(&self) -> &str {
        SEARCH_KNOWN_ISSUES
    }

    fn description(&self) -> &str {
        "Search known issues for a service. Args: {\"service\": \"name\", \"query\": \"free text\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let service = required_str(&args, "service")?;
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        Ok(self.catalog.known_issues(service, query))
    }
}

/// 把三个补全工具注册到同一份 catalog 上
pub fn register_enrichment_tools(registry: &mut ToolRegistry, catalog: Arc<OpsCatalog>) {
    registry.register(FetchServiceHealthTool::new(catalog.clone()));
    registry.register(LookupRunbookTool::new(catalog.clone()));
    registry.register(SearchKnownIssuesTool::new(catalog));
}

/// 使用演示数据的注册表
pub fn demo_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_enrichment_tools(&mut registry, Arc::new(OpsCatalog::demo()));
    registry
}
