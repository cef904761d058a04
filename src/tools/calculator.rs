//! Calculator 工具：四则运算

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolError};

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Perform basic arithmetic
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CalculatorArgs {
    /// Left operand
    pub a: f64,
    /// Right operand
    pub b: f64,
    /// One of add, subtract, multiply, divide
    pub operation: Operation,
}

impl CalculatorArgs {
    /// 计算结果；除数为 0 时返回 None
    pub fn evaluate(&self) -> Option<f64> {
        match self.operation {
            Operation::Add => Some(self.a + self.b),
            Operation::Subtract => Some(self.a - self.b),
            Operation::Multiply => Some(self.a * self.b),
            Operation::Divide if self.b == 0.0 => None,
            Operation::Divide => Some(self.a / self.b),
        }
    }
}

/// 整数结果不带小数部分（4 而非 4.0）
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic on two numbers (add, subtract, multiply, divide). Returns the result."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CalculatorArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: CalculatorArgs = parse_args(args)?;
        Ok(match args.evaluate() {
            Some(n) => format_number(n),
            None => "invalid division".to_string(),
        })
    }
}
