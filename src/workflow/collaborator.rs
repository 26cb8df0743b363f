//! 推理协作方接口
//!
//! 引擎只通过 ReasoningCollaborator 委托推理：传入阶段名、提示消息与输出契约（目标形态的 JSON Schema），
//! 拿回任意形态的 StageOutput，交给 Result Parser 处理。LlmCollaborator 把任意 LlmClient 适配成协作方。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::workflow::parser::{StageOutput, StageResult};
use crate::workflow::types::StageKind;

/// 阶段输出契约：目标形态名 + JSON Schema
#[derive(Debug, Clone, PartialEq)]
pub struct OutputContract {
    pub name: &'static str,
    pub schema: Value,
}

impl OutputContract {
    pub fn of<T: StageResult>() -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            name: T::SHAPE,
            schema,
        }
    }

    /// 供 LLM 阅读的格式要求
    pub fn instruction(&self) -> String {
        format!(
            "Return ONLY a JSON object matching the {} schema below. No prose, no Markdown.\n{}",
            self.name,
            serde_json::to_string_pretty(&self.schema).unwrap_or_default()
        )
    }
}

/// 一次委托请求
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub run_id: String,
    pub stage: StageKind,
    pub messages: Vec<Message>,
    pub contract: OutputContract,
}

#[async_trait]
pub trait ReasoningCollaborator: Send + Sync {
    /// 委托一次推理；Err 表示调用本身失败（网络、鉴权等），格式问题不算失败
    async fn delegate(&self, request: &StageRequest) -> Result<StageOutput, String>;
}

/// 基于 LlmClient 的协作方：把输出契约插在第一条 User 消息之前，返回原始文本
pub struct LlmCollaborator {
    llm: Arc<dyn LlmClient>,
}

impl LlmCollaborator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReasoningCollaborator for LlmCollaborator {
    async fn delegate(&self, request: &StageRequest) -> Result<StageOutput, String> {
        let mut messages = request.messages.clone();
        let pos = messages
            .iter()
            .position(|m| m.is_user())
            .unwrap_or(messages.len());
        messages.insert(pos, Message::system(request.contract.instruction()));

        let text = self.llm.complete(&messages).await?;
        Ok(StageOutput::RawText(text))
    }
}
