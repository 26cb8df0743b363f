//! 拦截器契约与有序组合

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::memory::{total_chars, Message};

/// 被包裹的调用属于哪个粒度
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationKind {
    /// 整个推理阶段（一次协作方委托）
    Stage {
        message_count: usize,
        input_chars: usize,
    },
    /// 阶段内的单次工具调用
    Tool { args: Value },
}

/// 一次被包裹调用的上下文
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationContext {
    pub run_id: String,
    pub name: String,
    pub kind: InvocationKind,
}

impl InvocationContext {
    pub fn stage(run_id: impl Into<String>, name: impl Into<String>, messages: &[Message]) -> Self {
        Self {
            run_id: run_id.into(),
            name: name.into(),
            kind: InvocationKind::Stage {
                message_count: messages.len(),
                input_chars: total_chars(messages),
            },
        }
    }

    pub fn tool(run_id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            run_id: run_id.into(),
            name: name.into(),
            kind: InvocationKind::Tool { args },
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(self.kind, InvocationKind::Tool { .. })
    }
}

/// 成功完成时交给拦截器的信息
#[derive(Debug)]
pub struct Completion<'a> {
    pub elapsed: Duration,
    /// 结果的文本渲染（可能很长，记录前由拦截器自行截断）
    pub rendered: &'a str,
}

/// 失败时交给拦截器的信息
#[derive(Debug)]
pub struct Failure<'a> {
    pub elapsed: Duration,
    pub error: &'a str,
}

/// 固定的 before / after / on_failure 契约；默认实现为空
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    fn before(&self, _ctx: &InvocationContext) {}

    fn after(&self, _ctx: &InvocationContext, _completion: &Completion<'_>) {}

    fn on_failure(&self, _ctx: &InvocationContext, _failure: &Failure<'_>) {}
}

/// 有序拦截器列表
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.push(interceptor);
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn names(&self) -> Vec<String> {
        self.interceptors.iter().map(|i| i.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// 包裹一次调用：before（正序）→ 计时 → 执行 → after / on_failure（逆序）→ 原样返回
    pub async fn run<F, Fut, T, E>(&self, ctx: &InvocationContext, step: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: fmt::Display,
        E: fmt::Display,
    {
        for interceptor in &self.interceptors {
            interceptor.before(ctx);
        }

        let start = Instant::now();
        let result = step().await;
        let elapsed = start.elapsed();

        if self.interceptors.is_empty() {
            return result;
        }

        match &result {
            Ok(value) => {
                let rendered = value.to_string();
                let completion = Completion {
                    elapsed,
                    rendered: &rendered,
                };
                for interceptor in self.interceptors.iter().rev() {
                    interceptor.after(ctx, &completion);
                }
            }
            Err(error) => {
                let error = error.to_string();
                let failure = Failure {
                    elapsed,
                    error: &error,
                };
                for interceptor in self.interceptors.iter().rev() {
                    interceptor.on_failure(ctx, &failure);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        label: &'static str,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        fn before(&self, ctx: &InvocationContext) {
            self.events.lock().unwrap().push(format!("{}:before:{}", self.label, ctx.name));
        }

        fn after(&self, _ctx: &InvocationContext, completion: &Completion<'_>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:after:{}", self.label, completion.rendered));
        }

        fn on_failure(&self, _ctx: &InvocationContext, failure: &Failure<'_>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:error:{}", self.label, failure.error));
        }
    }

    fn chain_with(events: &Arc<Mutex<Vec<String>>>) -> InterceptorChain {
        InterceptorChain::new()
            .with(Arc::new(Recorder { label: "outer", events: events.clone() }))
            .with(Arc::new(Recorder { label: "inner", events: events.clone() }))
    }

    #[tokio::test]
    async fn test_success_passes_value_through_in_onion_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let chain = chain_with(&events);
        let ctx = InvocationContext::stage("run-1", "triage", &[Message::user("hi")]);

        let result: Result<String, String> = chain.run(&ctx, || async { Ok("done".to_string()) }).await;

        assert_eq!(result, Ok("done".to_string()));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "outer:before:triage",
                "inner:before:triage",
                "inner:after:done",
                "outer:after:done",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_is_logged_and_returned_unchanged() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let chain = chain_with(&events);
        let ctx = InvocationContext::tool("run-1", "fetch_service_health", serde_json::json!({"service": "api"}));

        let result: Result<String, std::io::Error> = chain
            .run(&ctx, || async {
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "backend unreachable"))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert_eq!(err.to_string(), "backend unreachable");
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "outer:before:fetch_service_health",
                "inner:before:fetch_service_health",
                "inner:error:backend unreachable",
                "outer:error:backend unreachable",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_is_transparent() {
        let chain = InterceptorChain::new();
        let ctx = InvocationContext::stage("run-1", "plan", &[]);
        let result: Result<u32, String> = chain.run(&ctx, || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_stage_context_counts_messages_and_chars() {
        let ctx = InvocationContext::stage(
            "run-1",
            "triage",
            &[Message::system("abc"), Message::user("hello")],
        );
        assert_eq!(
            ctx.kind,
            InvocationKind::Stage {
                message_count: 2,
                input_chars: 8
            }
        );
        assert!(!ctx.is_tool());
    }
}
