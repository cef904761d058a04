//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本依次返回预设响应；脚本耗尽后回退为回显最后一条 User 消息（纯文本，即最终回复），
//! 或重复同一条响应（用于最大回合数等场景）。记录每次请求，便于断言发送给模型的上下文。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{ChatRequest, ChatResponse, LlmClient, LlmError};
use crate::memory::{Role, ToolCall};

type CallHook = Box<dyn Fn(usize) + Send + Sync>;

/// 脚本耗尽后的行为
enum Fallback {
    Echo,
    Repeat(ChatResponse),
    Fail,
}

/// Mock 客户端：脚本化响应 + 请求记录
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    fallback: Fallback,
    requests: Mutex<Vec<ChatRequest>>,
    on_call: Option<CallHook>,
    delay: Option<Duration>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    /// 空脚本：每次回显最后一条 User 消息
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Fallback::Echo,
            requests: Mutex::new(Vec::new()),
            on_call: None,
            delay: None,
        }
    }

    /// 按顺序返回给定响应；耗尽后返回 Script 错误
    pub fn scripted(responses: impl IntoIterator<Item = ChatResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            fallback: Fallback::Fail,
            ..Self::new()
        }
    }

    /// 每次都返回同一响应
    pub fn repeating(response: ChatResponse) -> Self {
        Self {
            fallback: Fallback::Repeat(response),
            ..Self::new()
        }
    }

    /// 追加一次失败调用（模拟网络错误等）
    pub fn then_error(self, err: LlmError) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
        self
    }

    /// 每次调用时（在返回响应前）执行回调，参数为从 1 开始的调用序号
    pub fn on_call(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    /// 模拟网络延迟
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 构造带随机 id 的工具调用
    pub fn tool_call(name: &str, arguments: &str) -> ToolCall {
        ToolCall::new(format!("call_{}", uuid::Uuid::new_v4().simple()), name, arguments)
    }

    /// 已记录的请求
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn fallback_response(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        match &self.fallback {
            Fallback::Echo => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                Ok(ChatResponse::text(format!("Echo from Mock: {last_user}")))
            }
            Fallback::Repeat(resp) => {
                let mut resp = resp.clone();
                for tc in &mut resp.tool_calls {
                    tc.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                }
                Ok(resp)
            }
            Fallback::Fail => Err(LlmError::Script("mock script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let call_no = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| LlmError::Script("request log poisoned".to_string()))?;
            requests.push(request.clone());
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hook) = &self.on_call {
            hook(call_no);
        }
        let next = self
            .script
            .lock()
            .map_err(|_| LlmError::Script("script poisoned".to_string()))?
            .pop_front();
        match next {
            Some(resp) => resp,
            None => self.fallback_response(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            model: "mock".to_string(),
            messages: vec![Message::user(text)],
            tools: vec![],
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_mock_echo() {
        let mock = MockLlmClient::new();
        let resp = mock.chat(&request("hello")).await.unwrap();
        assert_eq!(resp.content, "Echo from Mock: hello");
        assert!(!resp.has_tool_calls());
    }

    #[tokio::test]
    async fn test_mock_script_then_exhausted() {
        let mock = MockLlmClient::scripted(vec![ChatResponse::text("one")]);
        assert_eq!(mock.chat(&request("x")).await.unwrap().content, "one");
        assert!(matches!(
            mock.chat(&request("x")).await,
            Err(LlmError::Script(_))
        ));
        assert_eq!(mock.call_count(), 2);
    }
}
