//! 流水线状态机
//!
//! Started → Triaged → Enriched → Planned → Formatted，任一非终态都可以转入 Failed。
//! 默认配置下没有分支和回环；审批闸门停在 Triaged，由调用方决定是否继续。

use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Started,
    Triaged,
    Enriched,
    Planned,
    Formatted,
    Failed,
}

impl PipelineState {
    /// 线性链上的下一个状态；终态返回 None
    pub fn next(self) -> Option<Self> {
        match self {
            PipelineState::Started => Some(PipelineState::Triaged),
            PipelineState::Triaged => Some(PipelineState::Enriched),
            PipelineState::Enriched => Some(PipelineState::Planned),
            PipelineState::Planned => Some(PipelineState::Formatted),
            PipelineState::Formatted | PipelineState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Formatted | PipelineState::Failed)
    }

    pub fn can_transition_to(self, to: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == PipelineState::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Started => "started",
            PipelineState::Triaged => "triaged",
            PipelineState::Enriched => "enriched",
            PipelineState::Planned => "planned",
            PipelineState::Formatted => "formatted",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}
