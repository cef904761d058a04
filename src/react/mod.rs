//! 回合层：参数解码、运行事件、回合引擎

pub mod decoder;
pub mod events;
pub mod loop_;

pub use decoder::{decode_arguments, repair_json, DecodeError};
pub use events::{AgentEvent, EventSink, ToolInvocation, UsageStats};
pub use loop_::{run_agent, RunOutcome, SYSTEM_PROMPT};
