//! 运行错误类型
//!
//! 只有 AgentError 会终止一次运行（由 Controller 转为 error 事件）；
//! 工具参数解析、校验与执行错误都在回合内折叠为 tool 消息，交给模型自行修正。

use thiserror::Error;

use crate::llm::LlmError;

/// 终止运行的错误（模型调用失败、事件通道关闭等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Event channel closed")]
    EventChannelClosed,

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// Controller 的同步使用错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Agent is already running. Stop it first.")]
    AlreadyRunning,
}
