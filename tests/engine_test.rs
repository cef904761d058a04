//! 回合引擎集成测试（Mock LLM 脚本驱动）

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hive::config::AgentConfig;
    use hive::core::{ControlSignals, RunControl};
    use hive::llm::{ChatResponse, LlmError, MockLlmClient};
    use hive::memory::{HistoryPolicy, Message, Role, ToolCall};
    use hive::react::{run_agent, AgentEvent, EventSink, RunOutcome};
    use hive::tools::{CalculatorTool, FinalAnswerTool, RequestUserInteractionTool, ToolRegistry};
    use hive::AgentError;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(CalculatorTool);
        r.register(FinalAnswerTool);
        r.register(RequestUserInteractionTool);
        r
    }

    fn add(id: &str, a: i64, b: i64) -> ToolCall {
        ToolCall::new(
            id,
            "calculator",
            format!(r#"{{"a": {a}, "b": {b}, "operation": "add"}}"#),
        )
    }

    fn answer(id: &str, content: &str) -> ToolCall {
        ToolCall::new(id, "final_answer", format!(r#"{{"content": "{content}"}}"#))
    }

    fn ask(id: &str, message: &str) -> ToolCall {
        ToolCall::new(
            id,
            "request_user_interaction",
            format!(r#"{{"message": "{message}"}}"#),
        )
    }

    async fn run(
        query: &str,
        config: &AgentConfig,
        llm: &MockLlmClient,
        control: RunControl,
    ) -> (Result<RunOutcome, AgentError>, Vec<AgentEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = run_agent(query, config, llm, &registry(), control, &EventSink::new(tx)).await;
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        (result, events)
    }

    fn kinds(events: &[AgentEvent]) -> Vec<&'static str> {
        events.iter().map(AgentEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_max_turns_exact_model_calls() {
        for n in [1usize, 3, 5] {
            let llm = MockLlmClient::repeating(ChatResponse::with_tool_calls(vec![add("x", 1, 1)]));
            let config = AgentConfig::default().with_max_turns(n);
            let (result, events) = run("loop", &config, &llm, RunControl::never()).await;

            assert_eq!(llm.call_count(), n);
            let k = kinds(&events);
            assert_eq!(k.iter().filter(|k| **k == "turn").count(), n);
            assert_eq!(k.iter().filter(|k| **k == "max_turns").count(), 1);
            assert!(!k.contains(&"final"));
            assert_eq!(*k.last().unwrap(), "max_turns");
            assert!(matches!(result.unwrap(), RunOutcome::MaxTurns { turn, .. } if turn == n));
        }
    }

    #[tokio::test]
    async fn test_zero_max_turns() {
        let llm = MockLlmClient::new();
        let config = AgentConfig::default().with_max_turns(0);
        let (result, events) = run("q", &config, &llm, RunControl::never()).await;
        assert_eq!(llm.call_count(), 0);
        assert_eq!(kinds(&events), vec!["max_turns"]);
        assert!(matches!(result.unwrap(), RunOutcome::MaxTurns { turn: 0, .. }));
    }

    #[tokio::test]
    async fn test_stop_before_iteration_k() {
        let k = 3;
        let token = CancellationToken::new();
        let hook_token = token.clone();
        let llm = MockLlmClient::repeating(ChatResponse::with_tool_calls(vec![add("x", 1, 2)]))
            .on_call(move |n| {
                if n == k - 1 {
                    hook_token.cancel();
                }
            });
        let config = AgentConfig::default().with_max_turns(10);
        let (result, events) = run("q", &config, &llm, RunControl::from_token(token)).await;

        assert_eq!(llm.call_count(), k - 1);
        assert_eq!(kinds(&events), vec!["turn", "turn", "stopped"]);
        assert!(matches!(events.last(), Some(AgentEvent::Stopped { turn, .. }) if *turn == k - 1));
        assert!(matches!(result.unwrap(), RunOutcome::Stopped { turn, .. } if turn == k - 1));
    }

    #[tokio::test]
    async fn test_stop_before_first_iteration() {
        let token = CancellationToken::new();
        token.cancel();
        let llm = MockLlmClient::new();
        let (result, events) = run("q", &AgentConfig::default(), &llm, RunControl::from_token(token)).await;
        assert_eq!(llm.call_count(), 0);
        assert_eq!(kinds(&events), vec!["stopped"]);
        assert!(matches!(result.unwrap(), RunOutcome::Stopped { turn: 0, .. }));
    }

    fn two_plus_two_script() -> Vec<ChatResponse> {
        vec![
            ChatResponse::with_tool_calls(vec![add("c1", 2, 2)]).usage(10, 5),
            ChatResponse::with_tool_calls(vec![add("c2", 4, 4)]).usage(20, 5),
            ChatResponse::with_tool_calls(vec![answer("c3", "8")]).usage(30, 5),
        ]
    }

    #[tokio::test]
    async fn test_pause_yields_identical_transcript() {
        let config = AgentConfig::default().with_max_turns(5);

        let plain = MockLlmClient::scripted(two_plus_two_script());
        let (expected, _) = run("q", &config, &plain, RunControl::never()).await;
        let expected = expected.unwrap();

        let signals = Arc::new(ControlSignals::new());
        let hook_signals = signals.clone();
        let paused = MockLlmClient::scripted(two_plus_two_script()).on_call(move |n| {
            if n == 1 {
                hook_signals.set_paused(true);
            }
        });
        let resumer = {
            let signals = signals.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                signals.set_paused(false);
            })
        };
        let (actual, events) = run("q", &config, &paused, signals.run_control()).await;
        resumer.await.unwrap();

        let actual = actual.unwrap();
        assert_eq!(actual, expected);
        assert_eq!(kinds(&events), vec!["turn", "turn", "turn", "final"]);
        assert_eq!(actual.usage().total_input, 60);
    }

    #[tokio::test]
    async fn test_compute_two_plus_two() {
        let llm = MockLlmClient::scripted([ChatResponse::with_tool_calls(vec![
            add("c1", 2, 2),
            answer("c2", "4"),
        ])]);
        let config = AgentConfig::default().with_max_turns(3);
        let (result, events) = run("compute 2+2", &config, &llm, RunControl::never()).await;

        assert_eq!(kinds(&events), vec!["turn", "final"]);
        match &events[0] {
            AgentEvent::Turn { turn, tool_calls, .. } => {
                assert_eq!(*turn, 0);
                assert_eq!(tool_calls[0].name, "calculator");
                assert_eq!(tool_calls[0].arguments.as_ref().unwrap()["operation"], "add");
                assert_eq!(tool_calls[0].result, "4");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(&events[1], AgentEvent::Final { content, .. } if content == "4"));

        let transcript = result.unwrap().transcript().to_vec();
        let roles: Vec<Role> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
        // 带工具调用的 assistant 消息总是带 reasoning_content
        assert_eq!(transcript[2].reasoning_content.as_deref(), Some(""));
        assert_eq!(transcript[3].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_interaction_then_resume() {
        let llm = MockLlmClient::scripted([
            ChatResponse::with_tool_calls(vec![add("c1", 1, 1)]),
            ChatResponse::with_tool_calls(vec![ask("c2", "Which unit?")]),
        ]);
        let config = AgentConfig::default().with_max_turns(5);
        let (result, events) = run("measure it", &config, &llm, RunControl::never()).await;

        assert_eq!(kinds(&events), vec!["turn", "turn", "user_interaction_requested"]);
        let (prompt, turn, history) = match result.unwrap() {
            RunOutcome::UserInteractionRequested {
                prompt,
                turn,
                transcript,
                ..
            } => (prompt, turn, transcript),
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(prompt, "Which unit?");
        assert_eq!(turn, 2);
        assert!(matches!(
            events.last(),
            Some(AgentEvent::UserInteractionRequested { turn: 2, .. })
        ));

        let resumed = MockLlmClient::scripted([ChatResponse::with_tool_calls(vec![answer(
            "c3", "2 meters",
        )])]);
        let config = config.resumed(history.clone(), turn);
        let (result, events) = run("meters", &config, &resumed, RunControl::never()).await;

        assert_eq!(kinds(&events), vec!["turn", "final"]);
        assert!(matches!(&events[0], AgentEvent::Turn { turn: 2, .. }));
        let sent = &resumed.requests()[0].messages;
        let mut expected = history;
        expected.push(Message::user("meters"));
        assert_eq!(sent, &expected);
        assert_eq!(sent.iter().filter(|m| m.is_user()).count(), 2);
        assert!(matches!(result.unwrap(), RunOutcome::Final { content, .. } if content == "2 meters"));
    }

    #[tokio::test]
    async fn test_decode_failure_does_not_abort() {
        let llm = MockLlmClient::scripted([
            ChatResponse::with_tool_calls(vec![
                ToolCall::new("bad", "calculator", "{{{ not json"),
                add("good", 2, 2),
            ]),
            ChatResponse::text("done"),
        ]);
        let (result, events) = run("q", &AgentConfig::default(), &llm, RunControl::never()).await;

        assert_eq!(kinds(&events), vec!["turn", "final"]);
        let transcript = result.unwrap().transcript().to_vec();
        let tool_msgs: Vec<&Message> = transcript.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_msgs.len(), 2);
        assert!(tool_msgs[0].content.starts_with("Invalid JSON in tool arguments:"));
        assert!(tool_msgs[0].content.contains("{{{ not json"));
        assert_eq!(tool_msgs[1].content, "4");
        // 第二次请求能看到错误信息，模型可自行修正
        assert_eq!(llm.requests()[1].messages.len(), transcript.len() - 1);
    }

    #[tokio::test]
    async fn test_repairable_arguments_execute() {
        let llm = MockLlmClient::scripted([ChatResponse::with_tool_calls(vec![
            ToolCall::new("c1", "calculator", r#"{"a": 2, "b": 3, "operation": "multiply",}"#),
            ToolCall::new("c2", "final_answer", "```json\n{\"content\": \"6\"}\n```"),
        ])]);
        let (result, _) = run("q", &AgentConfig::default(), &llm, RunControl::never()).await;
        assert!(matches!(result.unwrap(), RunOutcome::Final { content, .. } if content == "6"));
    }

    #[tokio::test]
    async fn test_disabled_tool_is_unknown() {
        let llm = MockLlmClient::scripted([
            ChatResponse::with_tool_calls(vec![add("c1", 2, 2), ToolCall::new("c2", "nope", "{}")]),
            ChatResponse::text("ok"),
        ]);
        let config = AgentConfig::default().with_enabled_tools(["final_answer"]);
        let (result, _) = run("q", &config, &llm, RunControl::never()).await;

        let declared: Vec<String> = llm.requests()[0]
            .tools
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(declared, vec!["final_answer"]);

        let transcript = result.unwrap().transcript().to_vec();
        let tool_msgs: Vec<&str> = transcript
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tool_msgs, vec!["Unknown tool: calculator", "Unknown tool: nope"]);
    }

    #[tokio::test]
    async fn test_invalid_arguments_become_tool_result() {
        let llm = MockLlmClient::scripted([
            ChatResponse::with_tool_calls(vec![ToolCall::new(
                "c1",
                "calculator",
                r#"{"a": 1, "b": 2, "operation": "modulo"}"#,
            )]),
            ChatResponse::with_tool_calls(vec![ToolCall::new("c2", "final_answer", "{}")]),
            ChatResponse::text("gave up"),
        ]);
        let (result, events) = run("q", &AgentConfig::default(), &llm, RunControl::never()).await;

        // 参数无效的 final_answer 不会结束运行
        assert_eq!(kinds(&events), vec!["turn", "turn", "final"]);
        let transcript = result.unwrap().transcript().to_vec();
        let tool_msgs: Vec<&Message> = transcript.iter().filter(|m| m.role == Role::Tool).collect();
        assert!(tool_msgs[0].content.starts_with("Invalid arguments:"));
        assert!(tool_msgs[0].content.contains("operation"));
        assert!(tool_msgs[1].content.contains("content"));
    }

    #[tokio::test]
    async fn test_interaction_wins_over_final() {
        let llm = MockLlmClient::scripted([ChatResponse::with_tool_calls(vec![
            answer("c1", "done"),
            ask("c2", "Sure?"),
        ])]);
        let (result, events) = run("q", &AgentConfig::default(), &llm, RunControl::never()).await;

        assert_eq!(kinds(&events), vec!["turn", "user_interaction_requested"]);
        assert!(matches!(
            result.unwrap(),
            RunOutcome::UserInteractionRequested { prompt, turn: 1, .. } if prompt == "Sure?"
        ));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let llm = MockLlmClient::scripted([ChatResponse::with_tool_calls(vec![add("c1", 1, 1)])])
            .then_error(LlmError::Api {
                status: 500,
                body: "boom".into(),
            });
        let (result, events) = run("q", &AgentConfig::default(), &llm, RunControl::never()).await;
        assert!(matches!(result, Err(AgentError::Llm(LlmError::Api { status: 500, .. }))));
        assert_eq!(kinds(&events), vec!["turn"]);
    }

    #[tokio::test]
    async fn test_history_pruned_before_model_call() {
        let seed = vec![
            Message::system("sys"),
            Message::user("first"),
            Message::assistant("a1"),
            Message::user("second"),
            Message::assistant("a2"),
        ];
        let config = AgentConfig::default()
            .resumed(seed, 2)
            .with_history(HistoryPolicy::default().with_max_turns(2));
        let llm = MockLlmClient::new();
        let (result, _) = run("third", &config, &llm, RunControl::never()).await;

        let sent: Vec<String> = llm.requests()[0]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(sent, vec!["sys", "first", "a1", "third"]);
        assert!(matches!(result.unwrap(), RunOutcome::Final { content, .. } if content == "Echo from Mock: third"));
    }

    #[tokio::test]
    async fn test_usage_is_cumulative() {
        let llm = MockLlmClient::scripted(two_plus_two_script());
        let (_, events) = run("q", &AgentConfig::default(), &llm, RunControl::never()).await;
        let totals: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Turn { usage, .. } => Some(usage.total_input),
                _ => None,
            })
            .collect();
        assert_eq!(totals, vec![10, 30, 60]);
    }
}
