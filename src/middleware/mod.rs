//! 埋点拦截器：阶段执行与工具调用的计时、结构化日志
//!
//! 拦截器是纯观察者：不能修改结果，也不能吞掉错误。InterceptorChain 按注册顺序调用 before，
//! 按相反顺序调用 after / on_failure，然后原样返回被包裹步骤的结果。

pub mod chain;
pub mod logging;
pub mod timing;

pub use chain::{Completion, Failure, Interceptor, InterceptorChain, InvocationContext, InvocationKind};
pub use logging::{truncate_preview, LoggingInterceptor, DEFAULT_PREVIEW_CHARS};
pub use timing::{format_summary, InvocationRecord, TimingInterceptor};
