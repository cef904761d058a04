//! 控制类工具：final_answer（终止）、request_user_interaction（交互）、thought（记录推理）
//!
//! 三者都只回显参数；回合引擎依据 role() 标记决定结束运行或挂起等待用户输入。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolError, ToolRole};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FinalAnswerArgs {
    /// The final answer text
    pub content: String,
}

/// 最终答案：结果即运行的最终输出
pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        "final_answer"
    }

    fn description(&self) -> &str {
        "Final answer tool. Use this when you have completed the task and want to output the final answer."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FinalAnswerArgs>()
    }

    fn role(&self) -> ToolRole {
        ToolRole::Terminal
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: FinalAnswerArgs = parse_args(args)?;
        Ok(args.content)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RequestUserInteractionArgs {
    /// The question or message to present to the user
    pub message: String,
}

/// 请求用户输入：运行挂起，由调用方带着新输入恢复
pub struct RequestUserInteractionTool;

#[async_trait]
impl Tool for RequestUserInteractionTool {
    fn name(&self) -> &str {
        "request_user_interaction"
    }

    fn description(&self) -> &str {
        "Use this when you need to ask the user a question, request clarification, or get additional information."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<RequestUserInteractionArgs>()
    }

    fn role(&self) -> ToolRole {
        ToolRole::Interactive
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: RequestUserInteractionArgs = parse_args(args)?;
        Ok(args.message)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ThoughtArgs {
    /// Thought content
    pub content: String,
}

pub struct ThoughtTool;

#[async_trait]
impl Tool for ThoughtTool {
    fn name(&self) -> &str {
        "thought"
    }

    fn description(&self) -> &str {
        "Write down reasoning before acting."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ThoughtArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: ThoughtArgs = parse_args(args)?;
        Ok(args.content)
    }
}
