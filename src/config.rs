//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `OPSCOPILOT__*` 覆盖
//! （双下划线表示嵌套，如 `OPSCOPILOT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::memory::DEFAULT_LANGUAGE;
use crate::middleware::DEFAULT_PREVIEW_CHARS;

const ENV_PREFIX: &str = "OPSCOPILOT";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub memory: MemorySection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// [pipeline] 段：委托与补全查询的超时、工具结果日志截断长度
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_delegation_timeout_secs")]
    pub delegation_timeout_secs: u64,
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,
    #[serde(default = "default_tool_result_preview_chars")]
    pub tool_result_preview_chars: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            delegation_timeout_secs: default_delegation_timeout_secs(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
            tool_result_preview_chars: default_tool_result_preview_chars(),
        }
    }
}

impl PipelineSection {
    pub fn delegation_timeout(&self) -> Duration {
        Duration::from_secs(self.delegation_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

fn default_delegation_timeout_secs() -> u64 {
    60
}

fn default_lookup_timeout_secs() -> u64 {
    10
}

fn default_tool_result_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}

/// [memory] 段：上下文记忆的初始偏好语言
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_preferred_language")]
    pub preferred_language: String,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            preferred_language: default_preferred_language(),
        }
    }
}

fn default_preferred_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// 从 config 目录加载配置，环境变量 OPSCOPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 OPSCOPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
