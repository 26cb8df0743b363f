//! 工具执行器
//!
//! 持有 ToolRegistry、单次调用超时与工具粒度的拦截器链；execute(run_id, tool, args, cancel) 在超时内调用工具，
//! 超时、失败或取消时转为 PipelineError（LookupTimeout / LookupFailed / Cancelled）。
//! 超时与取消都在拦截器包裹的步骤内部判定，因此每次调用都会走到 after 或 on_failure。

use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::PipelineError;
use crate::middleware::{InterceptorChain, InvocationContext};
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    interceptors: InterceptorChain,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            interceptors: InterceptorChain::new(),
        }
    }

    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// 执行指定工具；未注册返回 UnknownTool
    pub async fn execute(
        &self,
        run_id: &str,
        tool_name: &str,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| PipelineError::UnknownTool(tool_name.to_string()))?;

        let ctx = InvocationContext::tool(run_id, tool_name, args.clone());
        let limit = self.timeout;
        self.interceptors
            .run(&ctx, || async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(PipelineError::Cancelled(tool_name.to_string())),
                    result = timeout(limit, tool.execute(args)) => match result {
                        Ok(Ok(content)) => Ok(content),
                        Ok(Err(message)) => Err(PipelineError::LookupFailed {
                            tool: tool_name.to_string(),
                            message,
                        }),
                        Err(_) => Err(PipelineError::LookupTimeout {
                            tool: tool_name.to_string(),
                            timeout: limit,
                        }),
                    },
                }
            })
            .await
    }
}
