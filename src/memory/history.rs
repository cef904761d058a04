//! 对话历史剪枝
//!
//! 以「轮」为单位裁剪：每条 user 消息开启新一轮，其后的 assistant / tool 消息归入同一轮。
//! 可选保留首轮（原始问题）与 system 消息；未配置上限时不做任何处理。

use serde::{Deserialize, Serialize};

use crate::memory::Message;

/// 剪枝策略；max_turns 为 None 表示不剪枝
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryPolicy {
    /// 最多保留的轮数
    pub max_turns: Option<usize>,
    /// 是否总是保留第一轮（原始问题）
    pub keep_initial_query: bool,
    /// 是否保留 system 消息（剪枝后置于最前）
    pub keep_system_messages: bool,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            max_turns: None,
            keep_initial_query: true,
            keep_system_messages: true,
        }
    }
}

impl HistoryPolicy {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn keep_initial_query(mut self, keep: bool) -> Self {
        self.keep_initial_query = keep;
        self
    }

    pub fn keep_system_messages(mut self, keep: bool) -> Self {
        self.keep_system_messages = keep;
        self
    }
}

/// 将消息划分为 system 消息与若干轮
fn split_turns(messages: &[Message]) -> (Vec<Message>, Vec<Vec<Message>>) {
    let mut system = Vec::new();
    let mut turns: Vec<Vec<Message>> = Vec::new();
    for msg in messages {
        if msg.is_system() {
            system.push(msg.clone());
        } else if msg.is_user() || turns.is_empty() {
            turns.push(vec![msg.clone()]);
        } else if let Some(current) = turns.last_mut() {
            current.push(msg.clone());
        }
    }
    (system, turns)
}

/// 按策略剪枝；对已剪枝结果再次应用同一策略不会继续缩减
pub fn prune(messages: &[Message], policy: &HistoryPolicy) -> Vec<Message> {
    let Some(max_turns) = policy.max_turns else {
        return messages.to_vec();
    };
    // 至少保留一轮，保证请求中仍有 user 消息
    let max_turns = max_turns.max(1);

    let (system, mut turns) = split_turns(messages);

    let kept: Vec<Vec<Message>> = if policy.keep_initial_query && !turns.is_empty() {
        let first = turns.remove(0);
        let recent = max_turns.saturating_sub(1).min(turns.len());
        let mut kept = Vec::with_capacity(recent + 1);
        kept.push(first);
        kept.extend(turns.drain(turns.len() - recent..));
        kept
    } else {
        let recent = max_turns.min(turns.len());
        turns.drain(turns.len() - recent..).collect()
    };

    let mut out = if policy.keep_system_messages {
        system
    } else {
        Vec::new()
    };
    out.extend(kept.into_iter().flatten());
    out
}
