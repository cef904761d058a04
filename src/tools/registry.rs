//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / role / execute），由 ToolRegistry 按名注册与查找。
//! 工具角色用显式标记区分：Terminal（最终答案，结束运行）与 Interactive（请求用户输入，挂起运行），不靠名称匹配。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tools::{
    CalculatorTool, DateTimeTool, DirectoryCreatorTool, FileEditorTool, FileListerTool, FileMoverTool,
    FileReaderTool, FileWriterTool, FinalAnswerTool, RequestUserInteractionTool, SafeFs,
    ThoughtTool,
};

/// 工具错误：参数校验失败（指明字段）、执行失败、超时
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("field `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Execution(String),

    #[error("tool timed out after {0}s")]
    Timeout(u64),
}

impl ToolError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 工具角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolRole {
    #[default]
    Regular,
    /// 结果即最终答案，运行结束
    Terminal,
    /// 结果为向用户提出的问题，运行挂起等待输入
    Interactive,
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、角色、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（即 function.name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn role(&self) -> ToolRole {
        ToolRole::Regular
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>（有序，保证声明顺序稳定）
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 标准工具集；文件类工具限定在 workspace 内
    pub fn standard(workspace: impl AsRef<Path>) -> Self {
        let fs = SafeFs::new(workspace);
        let mut registry = Self::new();
        registry.register(CalculatorTool);
        registry.register(DateTimeTool);
        registry.register(ThoughtTool);
        registry.register(FinalAnswerTool);
        registry.register(RequestUserInteractionTool);
        registry.register(FileEditorTool::new(fs.clone()));
        registry.register(FileReaderTool::new(fs.clone()));
        registry.register(FileWriterTool::new(fs.clone()));
        registry.register(FileListerTool::new(fs.clone()));
        registry.register(DirectoryCreatorTool::new(fs.clone()));
        registry.register(FileMoverTool::new(fs));
        registry
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 仅保留给定名称的工具；未注册的名称记录告警后忽略
    pub fn subset(&self, names: &[String]) -> Self {
        let mut tools = BTreeMap::new();
        for name in names {
            match self.tools.get(name) {
                Some(tool) => {
                    tools.insert(name.clone(), tool.clone());
                }
                None => tracing::warn!(tool = %name, "enabled tool is not registered"),
            }
        }
        Self { tools }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// OpenAI function-calling 格式的工具声明
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters_schema(),
                    }
                })
            })
            .collect()
    }
}
