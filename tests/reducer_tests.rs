//! Tests for the stream reducer and the tool call lifecycle view.

mod common;

use common::*;
use futures::stream;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use weft::error::WeftError;
use weft::lifecycle::{self, ToolCallState};
use weft::reducer::{reduce, ReduceStatus, RequestIdentity, StreamReducer};
use weft::types::*;

#[tokio::test]
async fn hello_example() {
    let outcome = reduce(
        Vec::new(),
        events(vec![
            StreamEvent::text("Hel"),
            StreamEvent::text("lo"),
            StreamEvent::finish(FinishReason::Stop),
        ]),
        &CancellationToken::new(),
        |_| {},
    )
    .await;
    assert_eq!(outcome.status, ReduceStatus::Finished(FinishReason::Stop));
    assert_eq!(
        shape(&outcome.messages),
        vec![(Role::Assistant, Content::Text("Hello".into()))]
    );
}

#[tokio::test]
async fn streamed_tool_call_example() {
    let mut snapshots = Vec::new();
    let outcome = reduce(
        Vec::new(),
        events(vec![
            start("1", "write"),
            delta("1", r#"{"path":"a"}"#),
            call("1", "write", json!({"path": "a"})),
            result("1", "write", "ok"),
        ]),
        &CancellationToken::new(),
        |messages| snapshots.push(messages.to_vec()),
    )
    .await;

    assert_eq!(
        shape(&outcome.messages),
        vec![
            (
                Role::Assistant,
                Content::Parts(vec![Part::ToolCall(ToolCallPart::new(
                    "1",
                    "write",
                    json!({"path": "a"})
                ))])
            ),
            (
                Role::Tool,
                Content::Parts(vec![Part::ToolResult(ToolResultPart::new(
                    "1",
                    "write",
                    ToolOutput::Text("ok".into()),
                    false
                ))])
            ),
        ]
    );
    // start, parsed delta, result; the finalizing call changed nothing.
    assert_eq!(snapshots.len(), 3);
    // The stream ended without a finish event.
    assert_eq!(outcome.status, ReduceStatus::Finished(FinishReason::Other));
}

#[tokio::test]
async fn abort_mid_stream_keeps_partial_text() {
    let outcome = reduce(
        vec![Message::user("write a poem")],
        events(vec![
            StreamEvent::text("Roses"),
            StreamEvent::Abort,
            StreamEvent::text(" are red"),
        ]),
        &CancellationToken::new(),
        |_| {},
    )
    .await;
    assert_eq!(outcome.status, ReduceStatus::Aborted);
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.messages[1].text(), "Roses");
    assert!(!outcome.messages[1].is_error());
}

#[tokio::test]
async fn cancellation_error_from_stream_is_an_abort() {
    let outcome = reduce(
        Vec::new(),
        stream::iter(vec![Ok(StreamEvent::text("par")), Err(WeftError::Cancelled)]),
        &CancellationToken::new(),
        |_| {},
    )
    .await;
    assert_eq!(outcome.status, ReduceStatus::Aborted);
    assert_eq!(outcome.messages[0].text(), "par");
}

#[tokio::test]
async fn token_tripped_mid_stream_stops_consumption() {
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    let mut seen = 0;
    let outcome = reduce(
        Vec::new(),
        events(vec![
            StreamEvent::text("a"),
            StreamEvent::text("b"),
            StreamEvent::text("c"),
        ]),
        &cancel,
        |_| {
            seen += 1;
            if seen == 2 {
                trip.cancel();
            }
        },
    )
    .await;
    assert_eq!(outcome.status, ReduceStatus::Aborted);
    assert_eq!(outcome.messages[0].text(), "ab");
}

#[tokio::test]
async fn text_between_tool_calls_concatenates_in_order() {
    // Every split of the same text around two calls yields the same text.
    let text = "The quick brown fox";
    for cut in 0..=text.len() {
        let (head, tail) = text.split_at(cut);
        let mut list = vec![call("a", "read", json!({}))];
        list.extend(head.chars().map(|c| StreamEvent::text(c.to_string())));
        list.extend(tail.chars().map(|c| StreamEvent::text(c.to_string())));
        list.push(call("b", "read", json!({})));
        let outcome = reduce(Vec::new(), events(list), &CancellationToken::new(), |_| {}).await;
        let texts: Vec<String> = outcome
            .messages
            .iter()
            .filter(|m| matches!(m.content, Content::Text(_)))
            .map(Message::text)
            .collect();
        assert_eq!(texts, vec![text.to_string()]);
    }
}

#[tokio::test]
async fn duplicate_tool_calls_do_not_duplicate_parts() {
    let outcome = reduce(
        Vec::new(),
        events(vec![
            start("x", "read"),
            call("x", "read", json!({"path": "a"})),
            call("x", "read", json!({"path": "b"})),
            call("x", "read", json!({"path": "b"})),
        ]),
        &CancellationToken::new(),
        |_| {},
    )
    .await;
    let ids: Vec<String> = outcome
        .messages
        .iter()
        .flat_map(|m| m.tool_calls().into_iter().map(|c| c.tool_call_id.clone()))
        .collect();
    assert_eq!(ids, vec!["x".to_string()]);
    assert_eq!(outcome.messages[0].tool_calls()[0].input, json!({"path": "b"}));
}

#[tokio::test]
async fn tool_start_after_text_is_mixed_content() {
    let outcome = reduce(
        Vec::new(),
        events(vec![
            StreamEvent::text("Let me look."),
            start("1", "read"),
            call("1", "read", json!({"path": "x"})),
        ]),
        &CancellationToken::new(),
        |_| {},
    )
    .await;
    assert_eq!(outcome.messages.len(), 1);
    assert_eq!(
        outcome.messages[0].content,
        Content::Parts(vec![
            Part::text("Let me look."),
            Part::ToolCall(ToolCallPart::new("1", "read", json!({"path": "x"}))),
        ])
    );
}

#[tokio::test]
async fn error_event_is_recorded_with_readable_text() {
    let cases = vec![
        (serde_json::Value::Null, "Unknown error occurred"),
        (json!("socket closed"), "socket closed"),
        (
            json!({"type": "overloaded_error", "message": "Overloaded"}),
            "overloaded_error: Overloaded",
        ),
        (json!({"message": "bad request"}), "bad request"),
        (json!({"code": 7}), r#"{"code":7}"#),
    ];
    for (payload, expected) in cases {
        let outcome = reduce(
            vec![Message::user("hi")],
            events(vec![
                StreamEvent::Error {
                    error: ErrorPayload::Value(payload),
                },
                StreamEvent::text("ignored"),
            ]),
            &CancellationToken::new(),
            |_| {},
        )
        .await;
        assert_eq!(outcome.status, ReduceStatus::Errored(expected.to_string()));
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[1].text(), expected);
        assert!(outcome.messages[1].is_error());
    }
}

#[tokio::test]
async fn text_after_error_message_starts_a_new_message() {
    let history = vec![Message::assistant("failed").with_metadata(Metadata {
        is_error: true,
        ..Metadata::now()
    })];
    let outcome = reduce(
        history,
        events(vec![StreamEvent::text("retrying")]),
        &CancellationToken::new(),
        |_| {},
    )
    .await;
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.messages[1].text(), "retrying");
}

#[tokio::test]
async fn authentication_errors_carry_remediation() {
    let mut reducer = StreamReducer::new(
        Vec::new(),
        RequestIdentity {
            session_id: "s1".into(),
            request_id: "r1".into(),
        },
    );
    reducer.apply(StreamEvent::Error {
        error: ErrorPayload::Value(json!({"message": "401 Unauthorized"})),
    });
    let metadata = reducer.messages()[0].metadata.clone().unwrap();
    assert!(metadata.is_error);
    assert_eq!(metadata.session_id.as_deref(), Some("s1"));
    assert_eq!(metadata.request_id.as_deref(), Some("r1"));
    assert!(metadata.created_at.is_some());
    let commands: Vec<&str> = metadata.actions.iter().map(|a| a.command.as_str()).collect();
    assert_eq!(commands, vec!["weft.configureApiKey", "weft.retry"]);
}

#[tokio::test]
async fn lifecycle_follows_the_stream() {
    let mut reducer = StreamReducer::new(Vec::new(), RequestIdentity::default());
    reducer.apply(start("1", "write"));
    assert_eq!(reducer.tool_calls()[0].state, ToolCallState::Started);
    reducer.apply(delta("1", r#"{"path""#));
    assert_eq!(reducer.tool_calls()[0].state, ToolCallState::Started);
    reducer.apply(delta("1", r#":"a"}"#));
    assert_eq!(reducer.tool_calls()[0].state, ToolCallState::Streaming);
    reducer.apply(call("1", "write", json!({"path": "a"})));
    assert_eq!(reducer.tool_calls()[0].state, ToolCallState::Finalized);
    reducer.apply(tool_error("1", "write", "disk full"));
    assert_eq!(reducer.tool_calls()[0].state, ToolCallState::Errored);
    assert_eq!(reducer.tool_calls()[0].result_message, Some(1));

    reducer.apply(start("2", "read"));
    reducer.apply(StreamEvent::finish(FinishReason::Stop));
    let dangling = lifecycle::unresolved(reducer.messages());
    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].tool_call_id, "2");
}
