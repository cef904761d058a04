//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式，返回 reasoning_content)

use crate::llm::{LlmError, OpenAiClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 客户端
///
/// api_key 未传入时依次读取 `DEEPSEEK_API_KEY`、`OPENAI_API_KEY`
pub fn create_deepseek_client(
    api_key: Option<&str>,
    timeout_secs: Option<u64>,
) -> Result<OpenAiClient, LlmError> {
    let api_key = api_key
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), api_key.as_deref(), timeout_secs)
}
