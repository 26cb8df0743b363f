//! Result Parser：把不确定形态的阶段输出转成类型化结果
//!
//! 阶段输出是带标签的 `StageOutput`，按顺序尝试（先命中者胜）：
//! 1. 非空 Sequence 取第一个元素递归；
//! 2. Typed 且形态匹配则直接采用；
//! 3. Mapping 逐字段构造，缺字段或类型不符则整个分支失败；
//! 4. RawText 严格 JSON 解码（仅剥离首尾空白与一层 ```json 代码块）；
//! 5. 其余情况失败。
//!
//! 解码后还要做取值校验（confidence 越界直接拒绝）。对外的 `parse_stage_output` 永不失败：
//! 任何错误都会记一条诊断日志并返回该形态的兜底实例。

use std::fmt;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::workflow::types::{FinalPlan, TriageResult};

/// 已经是某种目标形态的结果（例如协作方直接返回了结构化对象）
#[derive(Debug, Clone, PartialEq)]
pub enum TypedResult {
    Triage(TriageResult),
    Plan(FinalPlan),
}

impl TypedResult {
    fn shape(&self) -> &'static str {
        match self {
            TypedResult::Triage(_) => TriageResult::SHAPE,
            TypedResult::Plan(_) => FinalPlan::SHAPE,
        }
    }
}

/// 协作方返回的原始输出
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    /// 有序序列，第一个元素为准
    Sequence(Vec<StageOutput>),
    Typed(TypedResult),
    /// 通用键值映射
    Mapping(Map<String, Value>),
    RawText(String),
    Unrecognized(Value),
}

impl From<Value> for StageOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                StageOutput::Sequence(items.into_iter().map(StageOutput::from).collect())
            }
            Value::Object(map) => StageOutput::Mapping(map),
            Value::String(text) => StageOutput::RawText(text),
            other => StageOutput::Unrecognized(other),
        }
    }
}

impl From<String> for StageOutput {
    fn from(text: String) -> Self {
        StageOutput::RawText(text)
    }
}

impl From<&str> for StageOutput {
    fn from(text: &str) -> Self {
        StageOutput::RawText(text.to_string())
    }
}

impl From<TriageResult> for StageOutput {
    fn from(triage: TriageResult) -> Self {
        StageOutput::Typed(TypedResult::Triage(triage))
    }
}

impl From<FinalPlan> for StageOutput {
    fn from(plan: FinalPlan) -> Self {
        StageOutput::Typed(TypedResult::Plan(plan))
    }
}

impl fmt::Display for StageOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutput::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            StageOutput::Typed(TypedResult::Triage(t)) => {
                write!(f, "{}", serde_json::to_string(t).unwrap_or_default())
            }
            StageOutput::Typed(TypedResult::Plan(p)) => {
                write!(f, "{}", serde_json::to_string(p).unwrap_or_default())
            }
            StageOutput::Mapping(map) => {
                write!(f, "{}", serde_json::to_string(map).unwrap_or_default())
            }
            StageOutput::RawText(text) => f.write_str(text),
            StageOutput::Unrecognized(value) => write!(f, "{}", value),
        }
    }
}

/// 解析失败原因（只用于诊断，不向流水线调用方传播）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty output sequence")]
    EmptySequence,

    #[error("typed output is a {found}, expected {expected}")]
    ShapeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("cannot decode {shape}: {reason}")]
    Decode { shape: &'static str, reason: String },

    #[error("invalid {shape}: {reason}")]
    Invalid { shape: &'static str, reason: String },

    #[error("unrecognized output: {0}")]
    Unrecognized(String),
}

/// 可由 Result Parser 产出的目标形态
pub trait StageResult: Sized + Clone + Serialize + DeserializeOwned + JsonSchema {
    /// 形态名（日志与输出契约中使用）
    const SHAPE: &'static str;

    fn fallback() -> Self;

    /// 从 Typed 输出中取出本形态；形态不符时原样退回
    fn from_typed(typed: TypedResult) -> Result<Self, TypedResult>;

    /// 解码后的取值校验
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl StageResult for TriageResult {
    const SHAPE: &'static str = "TriageResult";

    fn fallback() -> Self {
        TriageResult::fallback()
    }

    fn from_typed(typed: TypedResult) -> Result<Self, TypedResult> {
        match typed {
            TypedResult::Triage(t) => Ok(t),
            other => Err(other),
        }
    }

    /// confidence 越界一律拒绝（不做截断）；需要审批时必须给出审批动作
    fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence {} is outside [0.0, 1.0]",
                self.confidence
            ));
        }
        if self.needs_approval && self.approval_action.is_none() {
            return Err("needs_approval is true but approval_action is missing".to_string());
        }
        Ok(())
    }
}

impl StageResult for FinalPlan {
    const SHAPE: &'static str = "FinalPlan";

    fn fallback() -> Self {
        FinalPlan::fallback()
    }

    fn from_typed(typed: TypedResult) -> Result<Self, TypedResult> {
        match typed {
            TypedResult::Plan(p) => Ok(p),
            other => Err(other),
        }
    }
}

/// 严格解析，返回失败原因
pub fn try_parse<T: StageResult>(output: StageOutput) -> Result<T, ParseError> {
    let value: T = match output {
        StageOutput::Sequence(items) => {
            let first = items.into_iter().next().ok_or(ParseError::EmptySequence)?;
            return try_parse(first);
        }
        StageOutput::Typed(typed) => T::from_typed(typed).map_err(|other| {
            ParseError::ShapeMismatch {
                expected: T::SHAPE,
                found: other.shape(),
            }
        })?,
        StageOutput::Mapping(map) => {
            serde_json::from_value(Value::Object(map)).map_err(|e| ParseError::Decode {
                shape: T::SHAPE,
                reason: e.to_string(),
            })?
        }
        StageOutput::RawText(text) => {
            serde_json::from_str(strip_code_fence(&text)).map_err(|e| ParseError::Decode {
                shape: T::SHAPE,
                reason: e.to_string(),
            })?
        }
        StageOutput::Unrecognized(value) => {
            return Err(ParseError::Unrecognized(value_kind(&value).to_string()))
        }
    };

    value.validate().map_err(|reason| ParseError::Invalid {
        shape: T::SHAPE,
        reason,
    })?;
    Ok(value)
}

/// 解析，失败时返回兜底实例并附带失败原因
pub fn parse_or_fallback<T: StageResult>(output: StageOutput) -> (T, Option<ParseError>) {
    match try_parse(output) {
        Ok(value) => (value, None),
        Err(e) => {
            tracing::warn!(shape = T::SHAPE, error = %e, "Failed to parse stage output, using fallback");
            (T::fallback(), Some(e))
        }
    }
}

/// 永不失败的解析入口
pub fn parse_stage_output<T: StageResult>(output: StageOutput) -> T {
    parse_or_fallback(output).0
}

/// 去掉首尾空白与一层 Markdown 代码块（```json ... ```）
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    body.strip_prefix("json").unwrap_or(body).trim()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
