//! 工具参数 Schema 生成与校验（schemars 自动生成工具 Schema）
//!
//! 每个工具以一个 `#[derive(Deserialize, JsonSchema)]` 参数结构体描述输入：
//! args_schema 生成供模型使用的 parameters 声明，parse_args 先按 schema 校验（缺失 / 类型错误 / 枚举越界时指明字段），再反序列化。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::tools::ToolError;

/// 生成参数结构体的 JSON Schema（子 schema 内联，去掉顶层 $schema / title / description）
pub fn args_schema<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("description");
        obj.remove("definitions");
        obj.entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
    }
    value
}

/// 按 T 的 schema 校验并反序列化工具参数
pub fn parse_args<T: JsonSchema + DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    validate(&args_schema::<T>(), &args)?;
    serde_json::from_value(args).map_err(|e| ToolError::validation("(arguments)", e.to_string()))
}

/// 校验 args 是否满足 schema 的 required / type / enum 约束
pub fn validate(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let obj = args
        .as_object()
        .ok_or_else(|| ToolError::validation("(arguments)", "expected a JSON object"))?;
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            match obj.get(field) {
                None | Some(Value::Null) => {
                    return Err(ToolError::validation(field, "missing required field"));
                }
                Some(_) => {}
            }
        }
    }

    for (field, value) in obj {
        let Some(prop) = properties.get(field).map(unwrap_all_of) else {
            continue;
        };
        if let Some(expected) = prop.get("type") {
            if !type_matches(expected, value) {
                return Err(ToolError::validation(
                    field.as_str(),
                    format!("expected {}, got {}", describe_type(expected), json_type(value)),
                ));
            }
        }
        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !value.is_null() && !allowed.contains(value) {
                let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
                return Err(ToolError::validation(
                    field.as_str(),
                    format!("{} is not one of [{}]", value, options.join(", ")),
                ));
            }
        }
    }
    Ok(())
}

/// 带 description 的子 schema 可能被包成单元素 allOf
fn unwrap_all_of(prop: &Value) -> &Value {
    match prop.get("allOf").and_then(Value::as_array) {
        Some(items) if items.len() == 1 => &items[0],
        _ => prop,
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        Value::String(t) => t.clone(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
