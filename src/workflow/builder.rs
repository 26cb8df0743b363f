//! 流水线构建器
//!
//! 提供流畅的API来组装 IncidentPipeline

use std::sync::Arc;
use std::time::Duration;

use crate::core::PipelineError;
use crate::memory::ContextMemory;
use crate::middleware::{Interceptor, InterceptorChain};
use crate::tools::{
    demo_registry, ToolExecutor, ToolRegistry, FETCH_SERVICE_HEALTH, LOOKUP_RUNBOOK,
    SEARCH_KNOWN_ISSUES,
};
use crate::workflow::collaborator::ReasoningCollaborator;
use crate::workflow::engine::IncidentPipeline;

pub const DEFAULT_DELEGATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// 流水线构建器
pub struct PipelineBuilder {
    collaborator: Arc<dyn ReasoningCollaborator>,
    memory: Option<ContextMemory>,
    tools: Option<ToolRegistry>,
    interceptors: InterceptorChain,
    delegation_timeout: Duration,
    lookup_timeout: Duration,
}

impl PipelineBuilder {
    /// 创建新的流水线构建器
    pub fn new(collaborator: Arc<dyn ReasoningCollaborator>) -> Self {
        Self {
            collaborator,
            memory: None,
            tools: None,
            interceptors: InterceptorChain::new(),
            delegation_timeout: DEFAULT_DELEGATION_TIMEOUT,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// 共享的上下文记忆；不设置时使用默认语言的新实例
    pub fn memory(mut self, memory: ContextMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    /// 补全查询使用的工具注册表；不设置时使用演示目录
    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.tools = Some(registry);
        self
    }

    /// 追加拦截器（阶段与工具调用共用同一条链）
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn delegation_timeout(mut self, timeout: Duration) -> Self {
        self.delegation_timeout = timeout;
        self
    }

    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// 构建流水线
    pub fn build(self) -> Result<IncidentPipeline, PipelineError> {
        if self.delegation_timeout.is_zero() {
            return Err(PipelineError::InvalidConfiguration(
                "delegation timeout must be greater than zero".to_string(),
            ));
        }
        if self.lookup_timeout.is_zero() {
            return Err(PipelineError::InvalidConfiguration(
                "lookup timeout must be greater than zero".to_string(),
            ));
        }

        let registry = self.tools.unwrap_or_else(demo_registry);
        let missing: Vec<&str> = [FETCH_SERVICE_HEALTH, LOOKUP_RUNBOOK, SEARCH_KNOWN_ISSUES]
            .into_iter()
            .filter(|name| !registry.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::InvalidConfiguration(format!(
                "missing enrichment tools: {}",
                missing.join(", ")
            )));
        }

        tracing::debug!(
            interceptors = ?self.interceptors.names(),
            tools = ?registry.tool_names(),
            "Building incident pipeline"
        );

        let tools = ToolExecutor::new(registry, self.lookup_timeout)
            .with_interceptors(self.interceptors.clone());

        Ok(IncidentPipeline::new(
            self.collaborator,
            tools,
            self.memory.unwrap_or_default(),
            self.interceptors,
            self.delegation_timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::middleware::TimingInterceptor;
    use crate::tools::{FetchServiceHealthTool, OpsCatalog};
    use crate::workflow::collaborator::LlmCollaborator;

    fn collaborator() -> Arc<dyn ReasoningCollaborator> {
        Arc::new(LlmCollaborator::new(Arc::new(MockLlmClient::new())))
    }

    #[test]
    fn test_build_with_defaults() {
        let pipeline = PipelineBuilder::new(collaborator()).build().unwrap();
        assert_eq!(pipeline.delegation_timeout(), DEFAULT_DELEGATION_TIMEOUT);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = PipelineBuilder::new(collaborator())
            .delegation_timeout(Duration::ZERO)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));

        let err = PipelineBuilder::new(collaborator())
            .lookup_timeout(Duration::ZERO)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_missing_enrichment_tools_are_reported() {
        let mut registry = ToolRegistry::new();
        registry.register(FetchServiceHealthTool::new(Arc::new(OpsCatalog::demo())));

        let err = PipelineBuilder::new(collaborator())
            .tools(registry)
            .build()
            .err()
            .unwrap();
        let message = err.to_string();
        assert!(message.contains(LOOKUP_RUNBOOK));
        assert!(message.contains(SEARCH_KNOWN_ISSUES));
        assert!(!message.contains(FETCH_SERVICE_HEALTH));
    }

    #[tokio::test]
    async fn test_shared_memory_is_used() {
        let memory = ContextMemory::with_language("english");
        let pipeline = PipelineBuilder::new(collaborator())
            .memory(memory.clone())
            .interceptor(Arc::new(TimingInterceptor::new()))
            .build()
            .unwrap();

        memory.set_language("french").await;
        assert_eq!(pipeline.memory().snapshot().await.preferred_language, "french");
    }
}
