//! 工具执行器
//!
//! 对单次工具调用施加超时并捕获 panic，统一映射为 ToolError；每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use tokio::time::timeout;

use crate::tools::{Tool, ToolError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// 工具执行器：超时 + panic 捕获 + 审计日志
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    timeout: Duration,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

impl ToolExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// 执行工具；工具代码内的 panic 被转为 Execution 错误，不会传播到回合引擎
    pub async fn execute(&self, tool: &Arc<dyn Tool>, args: Value) -> Result<String, ToolError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let call = AssertUnwindSafe(tool.execute(args)).catch_unwind();
        let result = match timeout(self.timeout, call).await {
            Ok(Ok(r)) => r,
            Ok(Err(panic)) => Err(ToolError::Execution(format!(
                "tool panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(ToolError::Timeout(self.timeout.as_secs())),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Validation { .. }) => "invalid_args",
            Err(ToolError::Execution(_)) => "error",
            Err(ToolError::Timeout(_)) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool.name(),
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");
        result
    }
}

/// 从 panic 负载中取出可读信息
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
