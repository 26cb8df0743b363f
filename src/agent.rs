//! Headless 流水线运行时
//!
//! 根据 AppConfig 组装 IncidentPipeline：create_llm_from_config 选择 LLM 后端，
//! create_pipeline_components 接上上下文记忆、演示目录、日志与计时拦截器。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::PipelineError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::ContextMemory;
use crate::middleware::{LoggingInterceptor, TimingInterceptor};
use crate::tools::demo_registry;
use crate::workflow::{IncidentPipeline, LlmCollaborator, PipelineBuilder};

/// 预构建的流水线组件：流水线本身 + 可共享的记忆、计时记录与 LLM 句柄
pub struct PipelineComponents {
    pub pipeline: IncidentPipeline,
    pub memory: ContextMemory,
    pub timing: TimingInterceptor,
    pub llm: Arc<dyn LlmClient>,
}

/// 按 [llm] 段选择后端：provider=openai 且有 OPENAI_API_KEY 时走 OpenAI 兼容端点，否则用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    match (provider.as_str(), api_key) {
        ("openai", Some(key)) => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
                cfg.llm.request_timeout(),
            ))
        }
        ("openai", None) => {
            tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        ("mock", _) => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        (other, _) => {
            tracing::warn!(provider = %other, "Unknown LLM provider, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 创建流水线组件
pub fn create_pipeline_components(cfg: &AppConfig) -> Result<PipelineComponents, PipelineError> {
    let llm = create_llm_from_config(cfg);
    create_pipeline_with_llm(cfg, llm)
}

/// 与 create_pipeline_components 相同，但使用调用方给定的 LLM（测试或自定义后端）
pub fn create_pipeline_with_llm(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<PipelineComponents, PipelineError> {
    let memory = ContextMemory::with_language(cfg.memory.preferred_language.clone());
    let timing = TimingInterceptor::new();

    let pipeline = PipelineBuilder::new(Arc::new(LlmCollaborator::new(llm.clone())))
        .memory(memory.clone())
        .tools(demo_registry())
        .interceptor(Arc::new(LoggingInterceptor::new(
            cfg.pipeline.tool_result_preview_chars,
        )))
        .interceptor(Arc::new(timing.clone()))
        .delegation_timeout(cfg.pipeline.delegation_timeout())
        .lookup_timeout(cfg.pipeline.lookup_timeout())
        .build()?;

    Ok(PipelineComponents {
        pipeline,
        memory,
        timing,
        llm,
    })
}
