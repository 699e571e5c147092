//! Integration tests for the parley-agent crate.
//!
//! These tests exercise the public building blocks (accumulation,
//! aggregation, the tool pipeline, message serialization) together, without
//! going through the orchestrator.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use parley_agent::{
    FinishReason, FunctionTool, Message, ModelChunk, Part, Role, StreamedUnit, ToolCall,
    ToolError, ToolPipeline, ToolRegistry, TurnAggregator, accumulate, consolidate,
};

// ═══════════════════════════════════════════════════════════════════════
//  Accumulation
// ═══════════════════════════════════════════════════════════════════════

fn fold(chunks: &[ModelChunk]) -> Message {
    chunks
        .iter()
        .fold(Message::empty_model(), |acc, c| accumulate(&acc, &c.output))
}

#[test]
fn interleaved_call_fragments_resolve_to_one_call_each() {
    let chunks = [
        ModelChunk::call(ToolCall::from_value("a", "search", json!({}))),
        ModelChunk::call(ToolCall::from_value("b", "fetch", json!({}))),
        ModelChunk::text("Looking "),
        ModelChunk::call(ToolCall::from_value("a", "", json!({"q": "rust"}))),
        ModelChunk::text("it up"),
        ModelChunk::call(ToolCall::from_value("b", "", json!({"url": "https://example.com"}))),
    ];

    let turn = consolidate(&fold(&chunks));
    let calls = turn.tool_calls();

    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].tool_name, "search");
    assert_eq!(calls[0].arguments["q"], "rust");
    assert_eq!(calls[1].tool_name, "fetch");
    assert_eq!(calls[1].arguments["url"], "https://example.com");
    assert_eq!(turn.parts[0], Part::text("Looking it up"));
}

#[test]
fn fragments_without_id_are_kept_separately() {
    let chunks = [
        ModelChunk::call(ToolCall::from_value("", "search", json!({"q": "a"}))),
        ModelChunk::call(ToolCall::from_value("", "search", json!({"q": "b"}))),
    ];
    assert_eq!(fold(&chunks).tool_calls().len(), 2);
}

#[test]
fn consolidated_turn_orders_text_before_thinking() {
    let chunks = [
        ModelChunk::thinking("let me "),
        ModelChunk::text("The answer"),
        ModelChunk::thinking("think"),
        ModelChunk::text(" is 4."),
    ];

    let turn = consolidate(&fold(&chunks));

    assert_eq!(
        turn.parts,
        vec![Part::text("The answer is 4."), Part::thinking("let me think")]
    );
    assert_eq!(consolidate(&turn), turn);
}

// ═══════════════════════════════════════════════════════════════════════
//  Aggregation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn aggregator_never_returns_thinking_only_turns() {
    let mut aggregator = TurnAggregator::new();
    aggregator.add(&StreamedUnit {
        thinking: "hmm".into(),
        ..StreamedUnit::default()
    });
    aggregator.add(&StreamedUnit::with_messages(
        vec![
            Message::model(vec![Part::thinking("hmm")]),
            Message::model_text("answer"),
        ],
        FinishReason::Stop,
    ));

    let result = aggregator.build_final();

    assert_eq!(result.messages.len(), 1);
    assert!(result.messages.iter().all(|m| !m.is_thinking_only()));
    assert_eq!(result.thinking.as_deref(), Some("hmm"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Tool pipeline
// ═══════════════════════════════════════════════════════════════════════

fn timed_registry(log: Arc<Mutex<Vec<String>>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for (name, delay_ms) in [("a", 5_u64), ("b", 60), ("c", 0)] {
        let log = Arc::clone(&log);
        registry = registry.with(FunctionTool::new(
            name,
            "Sleeps, then records its name",
            json!({"type": "object"}),
            move |_args: Value| {
                let log = Arc::clone(&log);
                async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    log.lock().unwrap().push(name.to_owned());
                    Ok(json!(name))
                }
            },
        ));
    }
    registry
}

#[tokio::test]
async fn batch_preserves_order_when_middle_call_is_slowest() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = timed_registry(Arc::clone(&log));
    let calls: Vec<_> = ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, name)| ToolCall::from_value(format!("call-{i}"), *name, json!({})))
        .collect();

    let results = ToolPipeline::new().execute_batch(&calls, &registry).await;

    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    assert_eq!(results.len(), 3);
    for (call, result) in calls.iter().zip(&results) {
        assert_eq!(result.result.call_id, call.call_id);
        assert!(result.is_success());
    }
}

#[tokio::test]
async fn missing_tool_payload_parses_to_error_map() {
    let results = ToolPipeline::new()
        .execute_batch(
            &[ToolCall::from_value("x", "does_not_exist", json!({}))],
            &ToolRegistry::new(),
        )
        .await;

    let result = &results[0];
    assert!(!result.is_success());
    assert_eq!(
        result.error,
        Some(ToolError::NotFound {
            name: "does_not_exist".into()
        })
    );
    let parsed: serde_json::Map<String, Value> =
        serde_json::from_str(&result.result.result_text()).unwrap();
    assert_eq!(parsed["error"], "Tool does_not_exist not found");
}

#[tokio::test]
async fn results_turn_is_a_user_turn() {
    let registry = timed_registry(Arc::new(Mutex::new(Vec::new())));
    let results = ToolPipeline::new()
        .execute_batch(&[ToolCall::from_value("1", "c", json!({}))], &registry)
        .await;

    let turn = Message::tool_results(results.into_iter().map(|r| r.result));
    assert_eq!(turn.role, Role::User);
    assert_eq!(turn.tool_results_iter().next().unwrap().result_text(), "c");
}

// ═══════════════════════════════════════════════════════════════════════
//  Serialization
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn message_json_shape_is_stable() {
    let message = Message::model(vec![
        Part::text("hi"),
        Part::call(ToolCall::from_value("c1", "echo", json!({"text": "x"}))),
    ]);

    let value = serde_json::to_value(&message).unwrap();

    assert_eq!(value["role"], "model");
    assert_eq!(value["parts"][0], json!({"type": "text", "content": "hi"}));
    assert_eq!(value["parts"][1]["type"], "tool");
    assert_eq!(value["parts"][1]["content"]["kind"], "call");
    assert_eq!(value["parts"][1]["content"]["call_id"], "c1");
}
