//! Tests for history repair.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;

use weft::repair::{repair, repair_with_report, RepairReport};
use weft::types::*;

fn histories() -> Vec<Vec<Message>> {
    vec![
        vec![],
        vec![Message::system("be brief"), Message::user("hi"), Message::assistant("hello")],
        vec![Message::user("go"), calls_message(&["a"]), results_message(&["a"])],
        vec![Message::user("go"), calls_message(&["a", "b"]), results_message(&["a"])],
        vec![Message::user("go"), calls_message(&["a"]), Message::user("again")],
        vec![results_message(&["z"]), Message::user("go")],
        vec![
            Message::user("go"),
            calls_message(&["a", "b"]),
            results_message(&["a"]),
            results_message(&["b"]),
            Message::assistant("done"),
        ],
        vec![
            Message::user("go"),
            Message::assistant_parts(vec![
                Part::text("Reading"),
                Part::ToolCall(ToolCallPart::new("a", "read", json!({}))),
            ]),
        ],
    ]
}

#[test]
fn repair_is_idempotent() {
    for history in histories() {
        let once = repair(&history);
        assert_eq!(repair(&once), once);
        let (_, report) = repair_with_report(&once);
        assert!(report.is_empty(), "second pass dropped {report:?}");
    }
}

#[test]
fn valid_history_is_unchanged() {
    let history = vec![
        Message::user("go"),
        calls_message(&["a", "b"]),
        results_message(&["a", "b"]),
        Message::assistant("done"),
    ];
    let (repaired, report) = repair_with_report(&history);
    assert_eq!(repaired, history);
    assert_eq!(report, RepairReport::default());
}

#[test]
fn partial_coverage_drops_every_call_and_the_orphaned_result() {
    let history = vec![
        Message::user("go"),
        calls_message(&["a", "b"]),
        results_message(&["a"]),
    ];
    let (repaired, report) = repair_with_report(&history);
    assert_eq!(shape(&repaired), shape(&history[..1]));
    assert_eq!(
        report,
        RepairReport {
            dropped_tool_calls: 2,
            dropped_tool_results: 1,
            dropped_messages: 2,
        }
    );
}

#[test]
fn stripped_call_keeps_its_text() {
    let history = vec![
        Message::user("go"),
        Message::assistant_parts(vec![
            Part::text("Reading"),
            Part::ToolCall(ToolCallPart::new("a", "read", json!({}))),
        ]),
        Message::user("never mind"),
    ];
    let repaired = repair(&history);
    assert_eq!(repaired.len(), 3);
    assert_eq!(repaired[1].content, Content::Parts(vec![Part::text("Reading")]));
    assert_eq!(repaired[2].text(), "never mind");
}

#[test]
fn results_split_across_tool_messages_still_pair() {
    let history = vec![
        Message::user("go"),
        calls_message(&["a", "b"]),
        results_message(&["a"]),
        results_message(&["b"]),
    ];
    let repaired = repair(&history);
    assert_eq!(repaired.len(), 3);
    let ids: Vec<&str> = repaired[2]
        .tool_results()
        .iter()
        .map(|r| r.tool_call_id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn orphaned_results_and_stray_ids_are_dropped() {
    let history = vec![
        results_message(&["ghost"]),
        Message::user("go"),
        calls_message(&["a"]),
        results_message(&["a", "stray", "a"]),
    ];
    let (repaired, report) = repair_with_report(&history);
    assert_eq!(repaired.len(), 3);
    assert_eq!(repaired[0].text(), "go");
    assert_eq!(repaired[2].tool_results().len(), 1);
    assert_eq!(report.dropped_tool_results, 3);
    assert_eq!(report.dropped_messages, 1);
}

#[test]
fn next_message_is_re_evaluated_after_a_strip() {
    // The second call message is paired on its own even though the first
    // one was stripped.
    let history = vec![
        Message::user("go"),
        calls_message(&["a"]),
        calls_message(&["b"]),
        results_message(&["b"]),
    ];
    let repaired = repair(&history);
    let expected = vec![history[0].clone(), history[2].clone(), history[3].clone()];
    assert_eq!(repaired, expected);
}

#[test]
fn user_and_system_messages_pass_through() {
    let history = vec![Message::system("sys"), Message::user("u")];
    assert_eq!(repair(&history), history);
}
