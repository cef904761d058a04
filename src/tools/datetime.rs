//! DateTime 工具：当前时间、格式化、解析、时间差

use std::fmt::Write;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolError};

/// 带时间的常用格式
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// 仅日期的常用格式（按 00:00:00 处理）
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateTimeOperation {
    CurrentDatetime,
    CurrentDate,
    CurrentTime,
    Format,
    Parse,
    Difference,
}

/// Access date and time information and perform datetime operations.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DateTimeArgs {
    /// current_datetime, current_date, current_time, format, parse or difference
    pub operation: DateTimeOperation,
    /// Input datetime string for format/parse
    #[serde(default)]
    pub datetime_string: Option<String>,
    /// strftime-style format string for format/parse (e.g. '%Y-%m-%d %H:%M:%S')
    #[serde(default)]
    pub format_string: Option<String>,
    /// First datetime for difference
    #[serde(default)]
    pub datetime_string_a: Option<String>,
    /// Second datetime for difference
    #[serde(default)]
    pub datetime_string_b: Option<String>,
}

/// 依次尝试 RFC 3339 与常用格式
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, ToolError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    {
        return Ok(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            ToolError::Execution(format!(
                "Could not parse datetime string: {s}. Supported formats: ISO 8601 / RFC 3339, \
                 YYYY-MM-DD[ HH:MM[:SS]], DD/MM/YYYY[ HH:MM[:SS]], MM/DD/YYYY[ HH:MM[:SS]]"
            ))
        })
}

fn required<'a>(value: &'a Option<String>, field: &str, op: &str) -> Result<&'a str, ToolError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ToolError::validation(field, format!("required for {op} operation")))
}

fn format_datetime(dt: &NaiveDateTime, fmt: &str) -> Result<String, ToolError> {
    let mut out = String::new();
    write!(out, "{}", dt.format(fmt))
        .map_err(|_| ToolError::Execution(format!("Invalid format string: {fmt}")))?;
    Ok(out)
}

/// 计算 a 与 b 的时间差描述
pub fn describe_difference(a: NaiveDateTime, b: NaiveDateTime) -> String {
    let (diff, direction) = if a > b { (a - b, "later") } else { (b - a, "earlier") };
    let total = diff.num_seconds();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!(
        "Time difference: {days} days, {hours} hours, {minutes} minutes, {seconds} seconds ({a} is {direction} than {b})"
    )
}

pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "datetime"
    }

    fn description(&self) -> &str {
        "Access date and time information and perform datetime operations (current_datetime, current_date, current_time, format, parse, difference)."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DateTimeArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: DateTimeArgs = parse_args(args)?;
        match args.operation {
            DateTimeOperation::CurrentDatetime => {
                Ok(format!("Current datetime: {}", Local::now().naive_local()))
            }
            DateTimeOperation::CurrentDate => {
                Ok(format!("Current date: {}", Local::now().date_naive()))
            }
            DateTimeOperation::CurrentTime => Ok(format!("Current time: {}", Local::now().time())),
            DateTimeOperation::Format => {
                let input = required(&args.datetime_string, "datetime_string", "format")?;
                let fmt = required(&args.format_string, "format_string", "format")?;
                let dt = parse_datetime(input)?;
                Ok(format!("Formatted datetime: {}", format_datetime(&dt, fmt)?))
            }
            DateTimeOperation::Parse => {
                let input = required(&args.datetime_string, "datetime_string", "parse")?;
                let fmt = required(&args.format_string, "format_string", "parse")?;
                let dt = NaiveDateTime::parse_from_str(input, fmt)
                    .or_else(|_| {
                        NaiveDate::parse_from_str(input, fmt)
                            .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
                    })
                    .map_err(|e| ToolError::Execution(format!("Error parsing datetime: {e}")))?;
                Ok(format!("Parsed datetime: {}", dt.format("%Y-%m-%dT%H:%M:%S")))
            }
            DateTimeOperation::Difference => {
                let a = required(&args.datetime_string_a, "datetime_string_a", "difference")?;
                let b = required(&args.datetime_string_b, "datetime_string_b", "difference")?;
                Ok(describe_difference(parse_datetime(a)?, parse_datetime(b)?))
            }
        }
    }
}
