//! 日志拦截器
//!
//! 阶段粒度：开始（消息数、输入字符数）/ 完成（耗时）/ 失败（错误 + 耗时）。
//! 工具粒度：额外记录参数，结果渲染截断到 preview_chars 个字符，控制日志量。

use crate::middleware::chain::{Completion, Failure, Interceptor, InvocationContext, InvocationKind};

pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// 按字符截断，超出部分以 "..." 结尾
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 通过 tracing 输出结构化事件
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    preview_chars: usize,
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CHARS)
    }
}

impl LoggingInterceptor {
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }

    pub fn preview_chars(&self) -> usize {
        self.preview_chars
    }
}

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    fn before(&self, ctx: &InvocationContext) {
        match &ctx.kind {
            InvocationKind::Stage {
                message_count,
                input_chars,
            } => tracing::info!(
                run_id = %ctx.run_id,
                stage = %ctx.name,
                messages = message_count,
                input_chars = input_chars,
                "Stage starting"
            ),
            InvocationKind::Tool { args } => tracing::info!(
                run_id = %ctx.run_id,
                tool = %ctx.name,
                args = %args,
                "Tool call"
            ),
        }
    }

    fn after(&self, ctx: &InvocationContext, completion: &Completion<'_>) {
        let elapsed_ms = completion.elapsed.as_millis() as u64;
        match &ctx.kind {
            InvocationKind::Stage { .. } => tracing::info!(
                run_id = %ctx.run_id,
                stage = %ctx.name,
                elapsed_ms,
                "Stage finished"
            ),
            InvocationKind::Tool { .. } => tracing::info!(
                run_id = %ctx.run_id,
                tool = %ctx.name,
                elapsed_ms,
                result = %truncate_preview(completion.rendered, self.preview_chars),
                "Tool result"
            ),
        }
    }

    fn on_failure(&self, ctx: &InvocationContext, failure: &Failure<'_>) {
        let elapsed_ms = failure.elapsed.as_millis() as u64;
        if ctx.is_tool() {
            tracing::error!(
                run_id = %ctx.run_id,
                tool = %ctx.name,
                elapsed_ms,
                error = %failure.error,
                "Tool error"
            );
        } else {
            tracing::error!(
                run_id = %ctx.run_id,
                stage = %ctx.name,
                elapsed_ms,
                error = %failure.error,
                "Stage error"
            );
        }
    }
}
