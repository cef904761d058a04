//! Hive - 工具调用型对话智能体内核
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与单次运行配置
//! - **core**: 执行控制器、运行控制信号、错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 消息模型与历史裁剪
//! - **observability**: tracing 初始化
//! - **react**: 参数解码、运行事件、回合引擎
//! - **tools**: 工具注册表、参数 Schema、执行器与标准工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::config::AgentConfig;
pub use crate::core::{AgentController, AgentError, ControllerError, RunControl};
pub use crate::react::{run_agent, AgentEvent, RunOutcome, UsageStats};
pub use crate::tools::ToolRegistry;
