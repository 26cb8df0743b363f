//! 计时拦截器：收集每次调用的耗时，供运行结束后输出汇总

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::middleware::chain::{Completion, Failure, Interceptor, InvocationContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationRecord {
    pub run_id: String,
    pub name: String,
    pub tool: bool,
    pub elapsed: Duration,
    pub ok: bool,
}

/// 可 clone 的句柄：交给拦截器链一份，调用方留一份读取记录
#[derive(Debug, Clone, Default)]
pub struct TimingInterceptor {
    records: Arc<Mutex<Vec<InvocationRecord>>>,
}

impl TimingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<InvocationRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 某次运行的记录
    pub fn records_for(&self, run_id: &str) -> Vec<InvocationRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.run_id == run_id)
            .collect()
    }

    /// 取出并移除某次运行的记录，其余运行的记录保留
    pub fn take_run(&self, run_id: &str) -> Vec<InvocationRecord> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let (taken, kept): (Vec<_>, Vec<_>) =
            records.drain(..).partition(|r| r.run_id == run_id);
        *records = kept;
        taken
    }

    fn push(&self, ctx: &InvocationContext, elapsed: Duration, ok: bool) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(InvocationRecord {
                run_id: ctx.run_id.clone(),
                name: ctx.name.clone(),
                tool: ctx.is_tool(),
                elapsed,
                ok,
            });
    }
}

impl Interceptor for TimingInterceptor {
    fn name(&self) -> &str {
        "timing"
    }

    fn after(&self, ctx: &InvocationContext, completion: &Completion<'_>) {
        self.push(ctx, completion.elapsed, true);
    }

    fn on_failure(&self, ctx: &InvocationContext, failure: &Failure<'_>) {
        self.push(ctx, failure.elapsed, false);
    }
}

/// 每行一条：`stage triage  812ms ok`
pub fn format_summary(records: &[InvocationRecord]) -> String {
    records
        .iter()
        .map(|r| {
            format!(
                "{} {:<24} {:>6}ms {}",
                if r.tool { "tool " } else { "stage" },
                r.name,
                r.elapsed.as_millis(),
                if r.ok { "ok" } else { "error" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
