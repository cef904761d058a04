//! 运行事件：回合引擎产出、Controller 转发、消费方按序逐个取走

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::AgentError;
use crate::llm::TokenCounts;
use crate::memory::Message;

/// Token 使用统计（本次调用 + 累计）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub input: u64,
    pub output: u64,
    pub total_input: u64,
    pub total_output: u64,
}

impl UsageStats {
    /// 记录一次模型调用的用量，累计值单调不减
    pub fn record(&mut self, counts: TokenCounts) {
        self.input = counts.input;
        self.output = counts.output;
        self.total_input += counts.input;
        self.total_output += counts.output;
    }
}

/// 一次已执行的工具调用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub raw_arguments: String,
    /// 解码成功时的参数
    pub arguments: Option<Value>,
    /// 解码失败原因
    pub decode_error: Option<String>,
    pub result: String,
}

/// 运行事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 一个带工具调用的回合结束
    Turn {
        turn: usize,
        content: String,
        reasoning: Option<String>,
        tool_calls: Vec<ToolInvocation>,
        history: Vec<Message>,
        usage: UsageStats,
    },
    /// 最终回答
    Final {
        content: String,
        reasoning: Option<String>,
        usage: UsageStats,
    },
    /// 收到停止信号
    Stopped { turn: usize, usage: UsageStats },
    /// 达到最大回合数
    MaxTurns { turn: usize, usage: UsageStats },
    /// 需要用户输入；turn 为恢复时的起始回合
    UserInteractionRequested {
        prompt: String,
        turn: usize,
        history: Vec<Message>,
        usage: UsageStats,
    },
    /// 运行异常终止
    Error { message: String, trace: String },
    /// 运行结束哨兵，总是最后一个事件
    WorkerFinished,
}

impl AgentEvent {
    /// 事件类型名（与序列化的 type 字段一致）
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Turn { .. } => "turn",
            AgentEvent::Final { .. } => "final",
            AgentEvent::Stopped { .. } => "stopped",
            AgentEvent::MaxTurns { .. } => "max_turns",
            AgentEvent::UserInteractionRequested { .. } => "user_interaction_requested",
            AgentEvent::Error { .. } => "error",
            AgentEvent::WorkerFinished => "worker_finished",
        }
    }
}

/// 事件发送端；消费方已关闭时报 EventChannelClosed
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<AgentEvent>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<AgentEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: AgentEvent) -> Result<(), AgentError> {
        self.tx
            .send(event)
            .map_err(|_| AgentError::EventChannelClosed)
    }
}
