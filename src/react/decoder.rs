//! 工具参数解码：严格解析 -> 宽松修复后再解析 -> DecodeError
//!
//! 模型产出的 arguments 常见问题：Markdown 代码块包裹、结尾多余逗号、字符串内裸换行、
//! 非法反斜杠转义、Python 风格 True/False/None、输出被截断导致括号未闭合。
//! 修复失败不终止运行，由回合引擎写成 tool 消息让模型自行修正。

use serde_json::{Map, Value};
use thiserror::Error;

/// 严格与修复两条路径均失败
#[derive(Error, Debug, Clone, PartialEq)]
#[error("strict parse failed: {strict}; repair failed: {repair}")]
pub struct DecodeError {
    pub raw: String,
    pub strict: String,
    pub repair: String,
}

/// 解码工具参数为 JSON 对象
pub fn decode_arguments(raw: &str) -> Result<Map<String, Value>, DecodeError> {
    let strict = match parse_object(raw) {
        Ok(map) => return Ok(map),
        Err(e) => e,
    };
    let repaired = repair_json(raw);
    match parse_object(&repaired) {
        Ok(map) => {
            tracing::debug!(raw = %raw, repaired = %repaired, "tool arguments repaired");
            Ok(map)
        }
        Err(repair) => Err(DecodeError {
            raw: raw.to_string(),
            strict,
            repair,
        }),
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 去掉 ```json 代码块包裹
fn strip_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(',') {
        out.pop();
    }
}

fn python_literal(word: &str) -> &str {
    match word {
        "True" => "true",
        "False" => "false",
        "None" => "null",
        other => other,
    }
}

/// 宽松修复：尽量把模型输出改写成合法 JSON（不保证成功）
pub fn repair_json(raw: &str) -> String {
    let body = strip_fence(raw);
    let Some(start) = body.find('{') else {
        return body.to_string();
    };
    let mut chars = body[start..].chars().peekable();
    let mut out = String::with_capacity(body.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '"' => {
                    in_string = false;
                    out.push('"');
                }
                '\\' => match chars.peek() {
                    Some(&n) if matches!(n, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                        out.push('\\');
                        out.push(n);
                        chars.next();
                    }
                    _ => out.push_str("\\\\"),
                },
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push('"');
            }
            '{' => {
                closers.push('}');
                out.push('{');
            }
            '[' => {
                closers.push(']');
                out.push('[');
            }
            '}' | ']' => {
                drop_trailing_comma(&mut out);
                if closers.last() == Some(&c) {
                    closers.pop();
                }
                out.push(c);
                if closers.is_empty() {
                    // 顶层对象已闭合，忽略其后的说明文字
                    break;
                }
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(python_literal(&word));
            }
            c => out.push(c),
        }
    }

    if in_string {
        out.push('"');
    }
    drop_trailing_comma(&mut out);
    if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(closer) = closers.pop() {
        drop_trailing_comma(&mut out);
        out.push(closer);
    }
    out
}
