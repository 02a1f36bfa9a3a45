//! Shared test helpers: event builders, canned histories and test tools.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use serde_json::json;

use weft::error::WeftError;
use weft::model::EventStream;
use weft::tools::{ClosureTool, Tool, ToolSet};
use weft::types::*;

/// Events as an infallible stream.
pub fn events(list: Vec<StreamEvent>) -> impl Stream<Item = Result<StreamEvent, WeftError>> {
    stream::iter(list.into_iter().map(Ok))
}

pub fn boxed(list: Vec<StreamEvent>) -> EventStream {
    events(list).boxed()
}

pub fn start(id: &str, tool_name: &str) -> StreamEvent {
    StreamEvent::ToolInputStart {
        id: id.into(),
        tool_name: tool_name.into(),
    }
}

pub fn delta(id: &str, chars: &str) -> StreamEvent {
    StreamEvent::ToolInputDelta {
        id: id.into(),
        delta: chars.into(),
    }
}

pub fn call(id: &str, tool_name: &str, input: serde_json::Value) -> StreamEvent {
    StreamEvent::ToolCall {
        id: id.into(),
        tool_name: tool_name.into(),
        input,
    }
}

pub fn result(id: &str, tool_name: &str, text: &str) -> StreamEvent {
    StreamEvent::ToolResult {
        id: id.into(),
        tool_name: tool_name.into(),
        output: ToolOutput::Text(text.into()),
    }
}

pub fn tool_error(id: &str, tool_name: &str, text: &str) -> StreamEvent {
    StreamEvent::ToolError {
        id: id.into(),
        tool_name: tool_name.into(),
        output: ToolOutput::Error(text.into()),
    }
}

/// Assistant message carrying one call per id.
pub fn calls_message(ids: &[&str]) -> Message {
    Message::assistant_parts(
        ids.iter()
            .map(|id| Part::ToolCall(ToolCallPart::new(*id, "read", json!({"path": id}))))
            .collect(),
    )
}

/// Tool message carrying one result per id.
pub fn results_message(ids: &[&str]) -> Message {
    Message::new(
        Role::Tool,
        Content::Parts(
            ids.iter()
                .map(|id| {
                    Part::ToolResult(ToolResultPart::new(
                        *id,
                        "read",
                        ToolOutput::Text(format!("contents of {id}")),
                        false,
                    ))
                })
                .collect(),
        ),
    )
}

/// Role and content of each message, for comparisons that ignore metadata.
pub fn shape(messages: &[Message]) -> Vec<(Role, Content)> {
    messages
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect()
}

pub fn echo_tool() -> Arc<dyn Tool> {
    Arc::new(ClosureTool::new(
        "echo",
        "Returns its input",
        json!({"type": "object"}),
        |input, _ctx| async move { Ok(input) },
    ))
}

/// A tool that sleeps until its cancellation token fires, counting starts.
pub fn blocking_tool(started: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    Arc::new(ClosureTool::new(
        "shell",
        "Runs until cancelled",
        json!({"type": "object"}),
        move |_input, ctx| {
            let started = started.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::select! {
                    _ = ctx.cancel.cancelled() => Err(WeftError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_secs(3600)) => Ok(json!("finished")),
                }
            }
        },
    ))
}

pub fn tools(list: Vec<Arc<dyn Tool>>) -> ToolSet {
    list.into_iter().collect()
}

/// A tool that records how many times it ran.
pub fn counting_tool(name: &'static str, runs: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    Arc::new(ClosureTool::new(
        name,
        "Counts its executions",
        json!({"type": "object"}),
        move |_input, _ctx| {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(json!("written"))
            }
        },
    ))
}
