//! 记忆层：对话消息模型与历史剪枝

pub mod conversation;
pub mod history;

pub use conversation::{Message, Role, ToolCall};
pub use history::{prune, HistoryPolicy};
