//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__MODEL=deepseek-reasoner`）。
//! AppConfig 是进程级配置；AgentConfig 是单次运行的不可变参数，由 AppConfig::agent_config 生成。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::llm::{DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, OPENAI_BASE_URL};
use crate::memory::{HistoryPolicy, Message};

const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_TURNS: usize = 12;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub history: HistorySection,
    pub tools: ToolsSection,
}

/// [llm] 段：后端、模型、温度与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；未设置 base_url 时决定默认地址
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 一般由环境变量 DEEPSEEK_API_KEY / OPENAI_API_KEY 提供
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    DEEPSEEK_CHAT.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_request_timeout() -> u64 {
    60
}

/// [agent] 段：回合上限、附加系统提示、启用的工具
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    pub extra_system: Option<String>,
    /// 未设置时启用全部标准工具
    pub enabled_tools: Option<Vec<String>>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            extra_system: None,
            enabled_tools: None,
        }
    }
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

/// [history] 段：历史裁剪策略，max_turns 未设置时不裁剪
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySection {
    pub max_turns: Option<usize>,
    #[serde(default = "default_true")]
    pub keep_initial_query: bool,
    #[serde(default = "default_true")]
    pub keep_system_messages: bool,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            max_turns: None,
            keep_initial_query: true,
            keep_system_messages: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl From<&HistorySection> for HistoryPolicy {
    fn from(s: &HistorySection) -> Self {
        HistoryPolicy {
            max_turns: s.max_turns,
            keep_initial_query: s.keep_initial_query,
            keep_system_messages: s.keep_system_messages,
        }
    }
}

/// [tools] 段：文件工具沙箱根、单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

impl AppConfig {
    /// 文件工具的沙箱根目录
    pub fn workspace_root(&self) -> PathBuf {
        self.tools
            .workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }

    /// 生成单次运行配置
    pub fn agent_config(&self) -> AgentConfig {
        let base_url = self.llm.base_url.clone().unwrap_or_else(|| {
            match self.llm.provider.to_lowercase().as_str() {
                "openai" => OPENAI_BASE_URL.to_string(),
                _ => DEEPSEEK_BASE_URL.to_string(),
            }
        });
        AgentConfig {
            api_key: self.llm.api_key.clone(),
            base_url: Some(base_url),
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            max_turns: self.agent.max_turns,
            extra_system: self.agent.extra_system.clone(),
            enabled_tools: self.agent.enabled_tools.clone(),
            history: HistoryPolicy::from(&self.history),
            request_timeout_secs: Some(self.llm.request_timeout_secs),
            tool_timeout_secs: self.tools.tool_timeout_secs,
            ..AgentConfig::default()
        }
    }
}

/// 单次运行配置；运行开始后回合引擎不修改它
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// 未设置时按后端读取环境变量（见 api_key_env_vars）
    pub api_key: Option<String>,
    /// 未设置时使用 DeepSeek
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_turns: usize,
    pub extra_system: Option<String>,
    /// 恢复运行时传入上次返回的完整对话
    pub initial_transcript: Option<Vec<Message>>,
    /// 恢复运行时的起始回合序号
    pub starting_turn: usize,
    /// None 表示注册表全部工具
    pub enabled_tools: Option<Vec<String>>,
    pub history: HistoryPolicy,
    pub request_timeout_secs: Option<u64>,
    pub tool_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEEPSEEK_CHAT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_turns: DEFAULT_MAX_TURNS,
            extra_system: None,
            initial_transcript: None,
            starting_turn: 0,
            enabled_tools: None,
            history: HistoryPolicy::default(),
            request_timeout_secs: None,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_extra_system(mut self, extra: impl Into<String>) -> Self {
        self.extra_system = Some(extra.into());
        self
    }

    pub fn with_enabled_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_history(mut self, policy: HistoryPolicy) -> Self {
        self.history = policy;
        self
    }

    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    /// 从交互暂停处恢复：沿用返回的对话，回合序号从 turn 继续
    pub fn resumed(mut self, transcript: Vec<Message>, turn: usize) -> Self {
        self.initial_transcript = Some(transcript);
        self.starting_turn = turn;
        self
    }

    /// 是否使用 DeepSeek 后端（未设置 base_url 时默认 DeepSeek）
    pub fn uses_deepseek(&self) -> bool {
        matches!(self.base_url.as_deref(), None | Some(DEEPSEEK_BASE_URL))
    }

    /// 读取 API Key 的环境变量顺序：与后端匹配的变量优先
    pub fn api_key_env_vars(&self) -> [&'static str; 2] {
        if self.uses_deepseek() {
            ["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]
        } else {
            ["OPENAI_API_KEY", "DEEPSEEK_API_KEY"]
        }
    }

    /// 显式配置或环境变量中的 API Key
    pub fn resolve_api_key(&self) -> Option<String> {
        let non_blank = |k: &String| !k.trim().is_empty();
        self.api_key.clone().filter(non_blank).or_else(|| {
            self.api_key_env_vars()
                .iter()
                .find_map(|name| std::env::var(name).ok().filter(non_blank))
        })
    }
}

/// 加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, skipped");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
