//! OpenAI 兼容 API 客户端
//!
//! 直接以 reqwest 调用 `{base_url}/chat/completions`（tool_choice = auto）。
//! 自行组装请求体是为了在 assistant 消息上回传 reasoning_content（DeepSeek 等后端要求）。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{ChatRequest, ChatResponse, LlmClient, LlmError, TokenCounts};
use crate::memory::{Message, Role, ToolCall};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// OpenAI 兼容客户端：持有 HTTP Client、base_url 与 api_key
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>, timeout_secs: Option<u64>) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// 将内部消息转为 chat-completions 请求格式
pub(crate) fn to_wire_message(m: &Message) -> Value {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut obj = json!({ "role": role, "content": m.content });
    if let Some(reasoning) = &m.reasoning_content {
        obj["reasoning_content"] = json!(reasoning);
    }
    if !m.tool_calls.is_empty() {
        obj["tool_calls"] = m
            .tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": { "name": tc.name, "arguments": tc.arguments },
                })
            })
            .collect();
    }
    if let Some(id) = &m.tool_call_id {
        obj["tool_call_id"] = json!(id);
    }
    obj
}

pub(crate) fn to_wire_request(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages.iter().map(to_wire_message).collect::<Vec<_>>(),
        "temperature": request.temperature,
    });
    if !request.tools.is_empty() {
        body["tools"] = json!(request.tools);
        body["tool_choice"] = json!("auto");
    }
    body
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub(crate) fn from_wire_response(body: &str) -> Result<ChatResponse, LlmError> {
    let parsed: WireResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let message = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?
        .message;
    let usage = parsed
        .usage
        .map(|u| TokenCounts {
            input: u.prompt_tokens,
            output: u.completion_tokens,
        })
        .unwrap_or_default();
    Ok(ChatResponse {
        content: message.content.unwrap_or_default(),
        reasoning: message.reasoning_content.filter(|r| !r.is_empty()),
        tool_calls: message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect(),
        usage,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&to_wire_request(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = from_wire_response(&body)?;
        tracing::debug!(
            model = %request.model,
            input_tokens = parsed.usage.input,
            output_tokens = parsed.usage.output,
            tool_calls = parsed.tool_calls.len(),
            "chat completion"
        );
        Ok(parsed)
    }
}
