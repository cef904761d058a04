//! 回合引擎：调用模型 -> 分发工具 -> 写回对话 -> 判断继续或结束
//!
//! 每回合开始前检查 RunControl（暂停时在此等待），随后按策略剪枝历史并调用模型。
//! 无工具调用的回复即最终答案；否则按返回顺序逐个解码、解析、执行工具，结果写为 tool 消息。
//! 同一回合内交互工具优先于终止工具：先请求用户输入，而不是直接结束。

use serde_json::Value;

use crate::config::AgentConfig;
use crate::core::{AgentError, RunControl};
use crate::llm::{ChatRequest, LlmClient};
use crate::memory::{prune, Message, ToolCall};
use crate::react::{decode_arguments, AgentEvent, EventSink, ToolInvocation, UsageStats};
use crate::tools::{ToolError, ToolExecutor, ToolRegistry, ToolRole};

/// 默认系统提示词
pub const SYSTEM_PROMPT: &str = "You are an assistant that can use tools.
First, think about the problem. Use the tools if needed. When done, use the final_answer tool to output your answer.
If you need more information from the user, use the request_user_interaction tool.

IMPORTANT: When providing long text content (e.g., for file writing), base64-encode it to avoid JSON escaping issues. Use the field `content_base64` for such tools.";

/// 一次运行的结束方式，附最终对话与用量
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Final {
        content: String,
        transcript: Vec<Message>,
        usage: UsageStats,
    },
    Stopped {
        turn: usize,
        transcript: Vec<Message>,
        usage: UsageStats,
    },
    MaxTurns {
        turn: usize,
        transcript: Vec<Message>,
        usage: UsageStats,
    },
    /// 软终止：带着 transcript 与新的用户输入从 turn 恢复
    UserInteractionRequested {
        prompt: String,
        turn: usize,
        transcript: Vec<Message>,
        usage: UsageStats,
    },
}

impl RunOutcome {
    pub fn transcript(&self) -> &[Message] {
        match self {
            RunOutcome::Final { transcript, .. }
            | RunOutcome::Stopped { transcript, .. }
            | RunOutcome::MaxTurns { transcript, .. }
            | RunOutcome::UserInteractionRequested { transcript, .. } => transcript,
        }
    }

    pub fn usage(&self) -> UsageStats {
        match self {
            RunOutcome::Final { usage, .. }
            | RunOutcome::Stopped { usage, .. }
            | RunOutcome::MaxTurns { usage, .. }
            | RunOutcome::UserInteractionRequested { usage, .. } => *usage,
        }
    }
}

/// 构造初始对话：有初始对话时原样沿用，否则为系统提示；最后追加本次用户输入
fn initial_transcript(query: &str, config: &AgentConfig) -> Vec<Message> {
    let mut transcript = match &config.initial_transcript {
        Some(seed) if !seed.is_empty() => seed.clone(),
        _ => {
            let mut t = vec![Message::system(SYSTEM_PROMPT)];
            if let Some(extra) = config.extra_system.as_deref().filter(|s| !s.trim().is_empty()) {
                t.push(Message::system(extra));
            }
            t
        }
    };
    transcript.push(Message::user(query));
    transcript
}

/// 解码、解析并执行单个工具调用；仅执行成功时返回工具角色
async fn dispatch(
    call: &ToolCall,
    tools: &ToolRegistry,
    executor: &ToolExecutor,
) -> (ToolInvocation, Option<ToolRole>) {
    let mut invocation = ToolInvocation {
        id: call.id.clone(),
        name: call.name.clone(),
        raw_arguments: call.arguments.clone(),
        arguments: None,
        decode_error: None,
        result: String::new(),
    };

    let args = match decode_arguments(&call.arguments) {
        Ok(map) => Value::Object(map),
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "undecodable tool arguments");
            invocation.result = format!("Invalid JSON in tool arguments: {e}. Raw: {}", e.raw);
            invocation.decode_error = Some(e.to_string());
            return (invocation, None);
        }
    };
    invocation.arguments = Some(args.clone());

    let Some(tool) = tools.get(&call.name) else {
        tracing::warn!(tool = %call.name, "unknown or disabled tool");
        invocation.result = format!("Unknown tool: {}", call.name);
        return (invocation, None);
    };

    match executor.execute(&tool, args).await {
        Ok(output) => {
            invocation.result = output;
            (invocation, Some(tool.role()))
        }
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "tool failed");
            invocation.result = match e {
                ToolError::Validation { .. } => format!("Invalid arguments: {e}"),
                ToolError::Execution(_) | ToolError::Timeout(_) => {
                    format!("Error executing tool: {e}")
                }
            };
            (invocation, None)
        }
    }
}

/// 运行回合引擎直到终止
///
/// 事件依次写入 events；模型调用失败以 AgentError::Llm 返回，工具相关错误均折叠为 tool 消息。
pub async fn run_agent(
    query: &str,
    config: &AgentConfig,
    llm: &dyn LlmClient,
    registry: &ToolRegistry,
    mut control: RunControl,
    events: &EventSink,
) -> Result<RunOutcome, AgentError> {
    let tools = match &config.enabled_tools {
        Some(names) => registry.subset(names),
        None => registry.clone(),
    };
    let definitions = tools.definitions();
    let executor = ToolExecutor::new(config.tool_timeout_secs);

    let mut transcript = initial_transcript(query, config);
    let mut usage = UsageStats::default();
    let mut turn = config.starting_turn;
    let last_turn = config.starting_turn.saturating_add(config.max_turns);

    tracing::info!(
        model = %config.model,
        starting_turn = turn,
        max_turns = config.max_turns,
        tools = tools.len(),
        "run started"
    );

    while turn < last_turn {
        if control.should_stop().await {
            tracing::info!(turn, "run stopped");
            events.emit(AgentEvent::Stopped { turn, usage })?;
            return Ok(RunOutcome::Stopped {
                turn,
                transcript,
                usage,
            });
        }

        let pruned = prune(&transcript, &config.history);
        if pruned.len() != transcript.len() {
            tracing::debug!(
                turn,
                dropped = transcript.len() - pruned.len(),
                "history pruned"
            );
        }
        transcript = pruned;

        let request = ChatRequest {
            model: config.model.clone(),
            messages: transcript.clone(),
            tools: definitions.clone(),
            temperature: config.temperature,
        };
        let response = llm.chat(&request).await?;
        usage.record(response.usage);
        tracing::info!(
            turn,
            tool_calls = response.tool_calls.len(),
            input_tokens = response.usage.input,
            output_tokens = response.usage.output,
            "model responded"
        );

        if !response.has_tool_calls() {
            transcript.push(Message::assistant_with_tools(
                response.content.clone(),
                response.reasoning.clone(),
                Vec::new(),
            ));
            events.emit(AgentEvent::Final {
                content: response.content.clone(),
                reasoning: response.reasoning,
                usage,
            })?;
            return Ok(RunOutcome::Final {
                content: response.content,
                transcript,
                usage,
            });
        }

        // assistant 消息先于 tool 结果写入，保持上下文因果顺序
        transcript.push(Message::assistant_with_tools(
            response.content.clone(),
            response.reasoning.clone(),
            response.tool_calls.clone(),
        ));

        let mut invocations = Vec::with_capacity(response.tool_calls.len());
        let mut final_answer: Option<String> = None;
        let mut interaction: Option<String> = None;
        for call in &response.tool_calls {
            let (invocation, role) = dispatch(call, &tools, &executor).await;
            transcript.push(Message::tool(call.id.clone(), invocation.result.clone()));
            match role {
                Some(ToolRole::Terminal) if final_answer.is_none() => {
                    final_answer = Some(invocation.result.clone());
                }
                Some(ToolRole::Interactive) if interaction.is_none() => {
                    interaction = Some(invocation.result.clone());
                }
                _ => {}
            }
            invocations.push(invocation);
        }

        events.emit(AgentEvent::Turn {
            turn,
            content: response.content.clone(),
            reasoning: response.reasoning.clone(),
            tool_calls: invocations,
            history: transcript.clone(),
            usage,
        })?;

        if let Some(prompt) = interaction {
            let next = turn + 1;
            tracing::info!(turn, "user interaction requested");
            events.emit(AgentEvent::UserInteractionRequested {
                prompt: prompt.clone(),
                turn: next,
                history: transcript.clone(),
                usage,
            })?;
            return Ok(RunOutcome::UserInteractionRequested {
                prompt,
                turn: next,
                transcript,
                usage,
            });
        }

        if let Some(content) = final_answer {
            tracing::info!(turn, "final answer");
            events.emit(AgentEvent::Final {
                content: content.clone(),
                reasoning: response.reasoning,
                usage,
            })?;
            return Ok(RunOutcome::Final {
                content,
                transcript,
                usage,
            });
        }

        turn += 1;
    }

    tracing::info!(turn, "max turns reached");
    events.emit(AgentEvent::MaxTurns { turn, usage })?;
    Ok(RunOutcome::MaxTurns {
        turn,
        transcript,
        usage,
    })
}
