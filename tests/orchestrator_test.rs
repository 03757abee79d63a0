use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use conductor::agents::llm::{MockProvider, MockResponse};
use conductor::agents::tools::{builtin_tools, calculator, ToolDefinition};
use conductor::agents::{AgentError, ChatOptions, ModelConfig, Orchestrator, Role, ToolCall};
use serde_json::json;

fn build(mock: &Arc<MockProvider>, tools: Vec<ToolDefinition>) -> Orchestrator {
    Orchestrator::builder(ModelConfig::mock())
        .system_prompt("You are a helpful assistant.")
        .tools(tools)
        .provider(mock.clone())
        .build()
}

fn sleeper(name: &str, millis: u64) -> ToolDefinition {
    ToolDefinition::from_fn(name, "Sleep, then report", json!({ "type": "object" }), move |_| async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(json!({ "slept_ms": millis }))
    })
}

#[tokio::test]
async fn test_simple_question_and_answer() {
    let mock = Arc::new(MockProvider::new().with_response("hello", MockResponse::text("Hi there!")));
    let orchestrator = build(&mock, Vec::new());

    let result = orchestrator.chat("hello", ChatOptions::new()).await.unwrap();

    assert_eq!(result.message.content, "Hi there!");
    assert_eq!(result.message.role, Role::Assistant);
    assert!(result.tool_results.is_empty());
    assert_eq!(result.iterations, 1);
    assert_eq!(mock.request_count(), 1);
    assert!(mock.requests()[0].tools.is_none());
}

#[tokio::test]
async fn test_calculator_round_trip() {
    let mock = Arc::new(
        MockProvider::new()
            .with_script(MockResponse::tool_call("calculator", json!({ "expression": "2+2" })))
            .with_script(MockResponse::text("The result is 4")),
    );
    let orchestrator = build(&mock, vec![calculator()]);

    let result = orchestrator.chat("What is 2+2?", ChatOptions::new()).await.unwrap();

    assert_eq!(result.message.content, "The result is 4");
    assert_eq!(result.iterations, 2);
    assert_eq!(result.tool_results.len(), 1);
    assert_eq!(result.tool_results[0].tool_name, "calculator");
    assert_eq!(result.tool_results[0].result.as_ref().and_then(|v| v.as_f64()), Some(4.0));

    // The second request carries the assistant tool request and its result
    let second = &mock.requests()[1].messages;
    let n = second.len();
    assert_eq!(second[n - 2].role, Role::Assistant);
    assert!(second[n - 2].has_tool_calls());
    assert_eq!(second[n - 1].role, Role::Tool);
    assert_eq!(second[n - 1].content, "4.0");
    assert_eq!(
        second[n - 1].tool_call_id.as_deref(),
        Some(second[n - 2].requested_tools()[0].id.as_str())
    );
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_model() {
    let mock = Arc::new(
        MockProvider::new()
            .with_script(MockResponse::tool_call("web_search", json!({ "q": "rust" })))
            .with_script(MockResponse::text("I cannot search the web.")),
    );
    let orchestrator = build(&mock, vec![calculator()]);

    let result = orchestrator.chat("search for rust", ChatOptions::new()).await.unwrap();

    assert_eq!(result.message.content, "I cannot search the web.");
    let failed = &result.tool_results[0];
    assert!(!failed.is_success());
    assert!(failed.error.as_deref().unwrap().contains("unknown tool"));

    let tool_message = mock.requests()[1].messages.last().cloned().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.content.starts_with("Error: unknown tool"));
}

#[tokio::test]
async fn test_tool_timeout_does_not_block_the_turn() {
    let stuck = ToolDefinition::from_fn("stuck", "Never returns", json!({ "type": "object" }), |_| async {
        std::future::pending::<()>().await;
        Ok(json!(null))
    })
    .with_timeout(Duration::from_millis(100));

    let mock = Arc::new(
        MockProvider::new()
            .with_script(MockResponse::tool_call("stuck", json!({})))
            .with_script(MockResponse::text("The tool timed out.")),
    );
    let orchestrator = build(&mock, vec![stuck]);

    let started = Instant::now();
    let result = orchestrator.chat("run it", ChatOptions::new()).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(result.tool_results[0].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(result.message.content, "The tool timed out.");
}

#[tokio::test]
async fn test_max_iterations_exceeded() {
    let mock = Arc::new(MockProvider::new().with_response(
        "loop",
        MockResponse::tool_call("calculator", json!({ "expression": "1+1" })),
    ));
    let orchestrator = Orchestrator::builder(ModelConfig::mock())
        .tool(calculator())
        .max_iterations(3)
        .provider(mock.clone())
        .build();

    let err = orchestrator.chat("loop forever", ChatOptions::new()).await.unwrap_err();

    assert!(matches!(err, AgentError::MaxIterations(3)));
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn test_usage_summed_across_iterations() {
    let mock = Arc::new(
        MockProvider::new()
            .with_script(
                MockResponse::tool_call("calculator", json!({ "expression": "3*3" })).with_usage(10, 5),
            )
            .with_script(MockResponse::text("9").with_usage(7, 3)),
    );
    let orchestrator = build(&mock, vec![calculator()]);

    let result = orchestrator.chat("square three", ChatOptions::new()).await.unwrap();

    assert_eq!(result.usage.input_tokens, 17);
    assert_eq!(result.usage.output_tokens, 8);
    assert_eq!(result.usage.total_tokens, 25);

    let metadata = result.message.metadata.unwrap();
    assert_eq!(metadata.input_tokens, Some(7));
    assert_eq!(metadata.model.as_deref(), Some("mock"));
}

#[tokio::test]
async fn test_results_keep_request_order() {
    let request = MockResponse::default()
        .with_call(ToolCall::new("call_a", "slow", json!({})))
        .with_call(ToolCall::new("call_b", "fast", json!({})))
        .with_call(ToolCall::new("call_c", "calculator", json!({ "expression": "10/4" })));
    let mock = Arc::new(
        MockProvider::new()
            .with_script(request)
            .with_script(MockResponse::text("done")),
    );
    let orchestrator = build(&mock, vec![sleeper("slow", 80), sleeper("fast", 1), calculator()]);

    let result = orchestrator.chat("go", ChatOptions::new()).await.unwrap();

    let ids: Vec<&str> = result.tool_results.iter().map(|r| r.tool_call_id.as_str()).collect();
    assert_eq!(ids, vec!["call_a", "call_b", "call_c"]);
    assert_eq!(result.tool_results[2].result, Some(json!(2.5)));

    let tool_ids: Vec<String> = mock.requests()[1]
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.clone())
        .collect();
    assert_eq!(tool_ids, vec!["call_a", "call_b", "call_c"]);
}

#[tokio::test]
async fn test_tool_changes_apply_to_later_calls() {
    let mock = Arc::new(MockProvider::new());
    let orchestrator = build(&mock, builtin_tools());

    orchestrator.chat("first", ChatOptions::new()).await.unwrap();
    assert!(orchestrator.remove_tool("json_parse").await);
    assert!(!orchestrator.remove_tool("json_parse").await);
    orchestrator.chat("second", ChatOptions::new()).await.unwrap();
    orchestrator.add_tool(sleeper("nap", 1)).await;
    orchestrator.chat("third", ChatOptions::new()).await.unwrap();

    let names: Vec<Vec<String>> = mock
        .requests()
        .iter()
        .map(|r| r.tools.clone().unwrap_or_default().into_iter().map(|t| t.name).collect())
        .collect();
    assert_eq!(names[0], vec!["calculator", "current_time", "json_parse"]);
    assert_eq!(names[1], vec!["calculator", "current_time"]);
    assert_eq!(names[2], vec!["calculator", "current_time", "nap"]);
}

#[tokio::test]
async fn test_observer_panic_is_contained() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let mock = Arc::new(
        MockProvider::new()
            .with_script(
                MockResponse::tool_call("calculator", json!({ "expression": "1+1" }))
                    .with_tool_call("calculator", json!({ "expression": "2+2" })),
            )
            .with_script(MockResponse::text("2 and 4")),
    );
    let orchestrator = Orchestrator::builder(ModelConfig::mock())
        .tool(calculator())
        .provider(mock.clone())
        .observer(move |_call, _result| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("observer failure");
        })
        .build();

    let result = orchestrator.chat("add things", ChatOptions::new()).await.unwrap();

    assert_eq!(result.message.content, "2 and 4");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert!(result.tool_results.iter().all(|r| r.is_success()));
}

#[tokio::test]
async fn test_final_content_is_verbatim() {
    let reply = "  Leading spaces, *markdown*, and a trailing newline\n";
    let mock = Arc::new(MockProvider::new().with_script(MockResponse::text(reply)));
    let orchestrator = build(&mock, Vec::new());

    let result = orchestrator.chat("anything", ChatOptions::new()).await.unwrap();
    assert_eq!(result.message.content, reply);
}

#[tokio::test]
async fn test_provider_error_propagates() {
    let mock = Arc::new(MockProvider::new().with_script(MockResponse::failure("overloaded")));
    let orchestrator = build(&mock, Vec::new());

    let err = orchestrator.chat("hello", ChatOptions::new()).await.unwrap_err();
    match err {
        AgentError::Provider(provider) => {
            assert_eq!(provider.provider, "mock");
            assert!(provider.to_string().contains("overloaded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_collect_matches_chat() {
    let script = || {
        MockProvider::new()
            .with_script(MockResponse::tool_call("calculator", json!({ "expression": "6*7" })))
            .with_script(MockResponse::text("The answer is 42"))
    };

    let chat_mock = Arc::new(script());
    let chat = build(&chat_mock, vec![calculator()])
        .chat("six times seven", ChatOptions::new().conversation_id("c-1"))
        .await
        .unwrap();

    let stream_mock = Arc::new(script());
    let streamed = build(&stream_mock, vec![calculator()])
        .chat_stream("six times seven", ChatOptions::new().conversation_id("c-1"))
        .collect()
        .await
        .unwrap();

    assert_eq!(streamed.message.content, chat.message.content);
    assert_eq!(streamed.iterations, chat.iterations);
    assert_eq!(streamed.conversation_id, chat.conversation_id);
    assert_eq!(streamed.tool_results[0].result, chat.tool_results[0].result);
    assert!(stream_mock.requests().iter().all(|r| r.stream));
}

#[tokio::test]
async fn test_stream_surfaces_errors() {
    let mock = Arc::new(MockProvider::new().with_script(MockResponse::failure("bad gateway")));
    let orchestrator = build(&mock, Vec::new());

    let err = orchestrator.chat_stream("hi", ChatOptions::new()).collect().await.unwrap_err();
    assert!(matches!(err, AgentError::Provider(_)));
}
