//! 执行控制器集成测试：重入、哨兵事件、停止与暂停

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use hive::config::AgentConfig;
    use hive::llm::{ChatRequest, ChatResponse, LlmClient, LlmError, MockLlmClient};
    use hive::memory::ToolCall;
    use hive::tools::{CalculatorTool, FinalAnswerTool, ToolRegistry};
    use hive::{AgentController, AgentEvent, ControllerError};

    const WAIT: Duration = Duration::from_secs(5);

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(CalculatorTool);
        r.register(FinalAnswerTool);
        r
    }

    fn add_call() -> ChatResponse {
        ChatResponse::with_tool_calls(vec![ToolCall::new(
            "c",
            "calculator",
            r#"{"a": 1, "b": 1, "operation": "add"}"#,
        )])
    }

    /// 读取事件直到 worker_finished（含）
    async fn drain(controller: &AgentController) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        loop {
            let ev = controller
                .get_event(true, Some(WAIT))
                .await
                .expect("timed out waiting for events");
            let done = matches!(ev, AgentEvent::WorkerFinished);
            events.push(ev);
            if done {
                return events;
            }
        }
    }

    struct PanickingLlm;

    #[async_trait]
    impl LlmClient for PanickingLlm {
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            panic!("model exploded")
        }
    }

    #[tokio::test]
    async fn test_run_ends_with_sentinel() {
        let controller = AgentController::new(registry()).with_llm(Arc::new(MockLlmClient::new()));
        controller.start("hello", AgentConfig::default()).unwrap();
        let events = drain(&controller).await;

        let kinds: Vec<&str> = events.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds, vec!["final", "worker_finished"]);
        assert!(matches!(&events[0], AgentEvent::Final { content, .. } if content == "Echo from Mock: hello"));
        assert!(!controller.is_running());
        assert!(controller.get_event(false, None).await.is_none());
    }

    #[tokio::test]
    async fn test_reentrant_start_rejected() {
        let llm = MockLlmClient::scripted([ChatResponse::text("slow")])
            .with_delay(Duration::from_millis(200));
        let controller = AgentController::new(registry()).with_llm(Arc::new(llm));
        controller.start("first", AgentConfig::default()).unwrap();
        assert!(controller.is_running());

        controller.pause();
        let err = controller
            .start("second", AgentConfig::default())
            .unwrap_err();
        assert_eq!(err, ControllerError::AlreadyRunning);
        assert_eq!(err.to_string(), "Agent is already running. Stop it first.");
        // 失败的 start 不重置控制信号
        assert!(controller.is_paused());
        assert!(controller.is_running());
        controller.resume();

        let events = drain(&controller).await;
        assert!(matches!(&events[0], AgentEvent::Final { content, .. } if content == "slow"));
        assert!(!controller.is_running());

        // 结束后可再次启动
        controller.start("third", AgentConfig::default()).unwrap();
        let events = drain(&controller).await;
        assert!(matches!(events.last(), Some(AgentEvent::WorkerFinished)));
    }

    #[tokio::test]
    async fn test_llm_error_becomes_error_event() {
        let llm = MockLlmClient::scripted(Vec::new());
        let controller = AgentController::new(registry()).with_llm(Arc::new(llm));
        controller.start("q", AgentConfig::default()).unwrap();
        let events = drain(&controller).await;

        assert_eq!(events.len(), 2);
        match &events[0] {
            AgentEvent::Error { message, trace } => {
                assert!(message.starts_with("LLM call failed"), "{message}");
                assert!(message.contains("mock script exhausted"), "{message}");
                assert!(trace.contains("mock script exhausted"), "{trace}");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[1], AgentEvent::WorkerFinished));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_api_error_cause_reaches_consumer() {
        let llm = MockLlmClient::scripted(Vec::new()).then_error(LlmError::Api {
            status: 401,
            body: "invalid api key".to_string(),
        });
        let controller = AgentController::new(registry()).with_llm(Arc::new(llm));
        controller.start("q", AgentConfig::default()).unwrap();
        let events = drain(&controller).await;

        match &events[0] {
            AgentEvent::Error { message, .. } => {
                assert!(message.contains("401"), "{message}");
                assert!(message.contains("invalid api key"), "{message}");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[1], AgentEvent::WorkerFinished));
    }

    #[tokio::test]
    async fn test_panic_becomes_error_event() {
        let controller = AgentController::new(registry()).with_llm(Arc::new(PanickingLlm));
        controller.start("q", AgentConfig::default()).unwrap();
        let events = drain(&controller).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AgentEvent::Error { message, .. } if message == "model exploded"));
        assert!(matches!(events[1], AgentEvent::WorkerFinished));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_stop_through_controller() {
        let llm = MockLlmClient::repeating(add_call()).with_delay(Duration::from_millis(20));
        let controller = AgentController::new(registry()).with_llm(Arc::new(llm));
        controller
            .start("q", AgentConfig::default().with_max_turns(1000))
            .unwrap();

        let first = controller.get_event(true, Some(WAIT)).await.unwrap();
        assert!(matches!(first, AgentEvent::Turn { turn: 0, .. }));
        controller.stop();

        let rest = drain(&controller).await;
        let kinds: Vec<&str> = rest.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds.last(), Some(&"worker_finished"));
        assert_eq!(kinds[kinds.len() - 2], "stopped");
        // 停止只在回合边界生效：至多再完成一个回合
        assert!(kinds.iter().filter(|k| **k == "turn").count() <= 1);
    }

    #[tokio::test]
    async fn test_stop_releases_pause() {
        let llm = MockLlmClient::repeating(add_call());
        let controller = AgentController::new(registry()).with_llm(Arc::new(llm));
        controller.start("q", AgentConfig::default().with_max_turns(1000)).unwrap();
        // 启动后立即暂停：worker 在某个回合开始前挂起
        controller.pause();
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.stop();
        assert!(!controller.is_paused());

        let events = drain(&controller).await;
        let kinds: Vec<&str> = events.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds[kinds.len() - 2], "stopped");
    }

    #[tokio::test]
    async fn test_pause_and_resume_through_controller() {
        let llm = Arc::new(MockLlmClient::repeating(add_call()).with_delay(Duration::from_millis(10)));
        let controller = AgentController::new(registry()).with_llm(llm.clone());
        controller
            .start("q", AgentConfig::default().with_max_turns(5))
            .unwrap();

        let first = controller.get_event(true, Some(WAIT)).await.unwrap();
        assert!(matches!(first, AgentEvent::Turn { .. }));
        controller.pause();

        // 进行中的回合会完成，之后不再调用模型
        tokio::time::sleep(Duration::from_millis(150)).await;
        let frozen = llm.call_count();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(llm.call_count(), frozen);
        assert!(frozen <= 2);
        assert!(controller.is_running());

        controller.resume();
        let events = drain(&controller).await;
        let kinds: Vec<&str> = events.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds[kinds.len() - 2], "max_turns");
        assert_eq!(llm.call_count(), 5);
    }

    #[tokio::test]
    async fn test_restart_drops_previous_run_events() {
        let controller = AgentController::new(registry()).with_llm(Arc::new(MockLlmClient::new()));
        controller.start("first", AgentConfig::default()).unwrap();
        // 不读取事件，只等运行标志清除后立即开始下一次运行
        tokio::time::timeout(WAIT, async {
            while controller.is_running() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("first run did not finish");
        controller.start("second", AgentConfig::default()).unwrap();

        let events = drain(&controller).await;
        let kinds: Vec<&str> = events.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds, vec!["final", "worker_finished"]);
        assert!(matches!(&events[0], AgentEvent::Final { content, .. } if content == "Echo from Mock: second"));
        assert!(controller.get_event(false, None).await.is_none());
    }

    #[tokio::test]
    async fn test_non_blocking_poll_while_another_caller_waits() {
        let controller = Arc::new(AgentController::new(registry()));
        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.get_event(true, Some(WAIT)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let polled = tokio::time::timeout(
            Duration::from_millis(200),
            controller.get_event(false, None),
        )
        .await
        .expect("non-blocking poll blocked behind a waiting caller");
        assert!(polled.is_none());
        waiter.abort();
    }

    #[tokio::test]
    async fn test_missing_api_key_reports_error() {
        if std::env::var("DEEPSEEK_API_KEY").is_ok() || std::env::var("OPENAI_API_KEY").is_ok() {
            return;
        }
        let controller = AgentController::new(registry());
        controller.start("q", AgentConfig::default()).unwrap();
        let events = drain(&controller).await;
        assert!(matches!(&events[0], AgentEvent::Error { message, .. } if message.contains("API key")));
        assert!(matches!(events[1], AgentEvent::WorkerFinished));
    }
}
