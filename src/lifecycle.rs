//! Tool call lifecycle tracking.
//!
//! A call moves through `Started → Streaming → Finalized → Resulted | Errored`.
//! Everything except the in-flight argument buffers is derived from the
//! conversation log itself: [`track`] scans a history for each call and its
//! matching result. The only mutable state is [`OpenToolCalls`], which holds
//! the raw argument text of calls the current stream has not finalized yet.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Message, Role, ToolCallPart};

/// Lifecycle state of one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    Started,
    Streaming,
    Finalized,
    Resulted,
    Errored,
}

impl ToolCallState {
    /// Whether the call has its result.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Resulted | Self::Errored)
    }
}

/// Observed state of a call within a history.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallStatus {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub state: ToolCallState,
    /// Index of the assistant message holding the call.
    pub call_message: usize,
    /// Index of the tool message holding the result.
    pub result_message: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct OpenCall {
    raw: String,
    parsed: bool,
}

/// Argument buffers of calls still streaming in the current request.
#[derive(Debug, Clone, Default)]
pub struct OpenToolCalls {
    calls: HashMap<String, OpenCall>,
}

impl OpenToolCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call that started streaming.
    pub fn start(&mut self, tool_call_id: &str) {
        self.calls.entry(tool_call_id.to_string()).or_default();
    }

    /// Append raw argument text and try to parse the accumulated buffer.
    ///
    /// Returns the parsed value once the buffer is a complete JSON document;
    /// incomplete fragments return `None` and are never an error.
    pub fn push_delta(&mut self, tool_call_id: &str, delta: &str) -> Option<serde_json::Value> {
        let call = self.calls.entry(tool_call_id.to_string()).or_default();
        call.raw.push_str(delta);
        let value = serde_json::from_str::<serde_json::Value>(&call.raw).ok()?;
        call.parsed = true;
        Some(value)
    }

    /// Drop the buffer of a finalized call.
    pub fn finalize(&mut self, tool_call_id: &str) {
        self.calls.remove(tool_call_id);
    }

    pub fn is_open(&self, tool_call_id: &str) -> bool {
        self.calls.contains_key(tool_call_id)
    }

    /// In-flight state of an open call, if it is still streaming.
    pub fn state(&self, tool_call_id: &str) -> Option<ToolCallState> {
        self.calls.get(tool_call_id).map(|call| {
            if call.parsed {
                ToolCallState::Streaming
            } else {
                ToolCallState::Started
            }
        })
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

/// Compute the state of every call in `history`, in order of appearance.
///
/// `open` refines calls the current stream has not finalized; pass an empty
/// set for a settled history.
pub fn track(history: &[Message], open: &OpenToolCalls) -> Vec<ToolCallStatus> {
    let mut statuses = Vec::new();
    for (index, message) in history.iter().enumerate() {
        if message.role != Role::Assistant {
            continue;
        }
        for call in message.tool_calls() {
            statuses.push(status_for(history, index, call, open));
        }
    }
    statuses
}

fn status_for(
    history: &[Message],
    call_message: usize,
    call: &ToolCallPart,
    open: &OpenToolCalls,
) -> ToolCallStatus {
    let result = history
        .iter()
        .enumerate()
        .skip(call_message + 1)
        .filter(|(_, message)| message.role == Role::Tool)
        .find_map(|(index, message)| {
            message
                .tool_results()
                .into_iter()
                .find(|result| result.tool_call_id == call.tool_call_id)
                .map(|result| (index, result.is_error))
        });

    let state = match result {
        Some((_, true)) => ToolCallState::Errored,
        Some((_, false)) => ToolCallState::Resulted,
        None => open
            .state(&call.tool_call_id)
            .unwrap_or(ToolCallState::Finalized),
    };

    ToolCallStatus {
        tool_call_id: call.tool_call_id.clone(),
        tool_name: call.tool_name.clone(),
        input: call.input.clone(),
        state,
        call_message,
        result_message: result.map(|(index, _)| index),
    }
}

/// Calls that are finalized but have no result: pairing violations once the
/// stream has ended.
pub fn unresolved(history: &[Message]) -> Vec<ToolCallStatus> {
    track(history, &OpenToolCalls::default())
        .into_iter()
        .filter(|status| status.state == ToolCallState::Finalized)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Part, ToolOutput, ToolResultPart};
    use serde_json::json;

    fn history() -> Vec<Message> {
        vec![
            Message::user("go"),
            Message::assistant_parts(vec![
                Part::ToolCall(ToolCallPart::new("a", "read", json!({"path": "x"}))),
                Part::ToolCall(ToolCallPart::new("b", "shell", json!({"cmd": "false"}))),
                Part::ToolCall(ToolCallPart::new("c", "write", json!({}))),
            ]),
            Message::tool_result(ToolResultPart::new("a", "read", ToolOutput::Text("ok".into()), false)),
            Message::tool_result(ToolResultPart::new("b", "shell", ToolOutput::Error("exit 1".into()), true)),
        ]
    }

    #[test]
    fn derives_states_from_history() {
        let statuses = track(&history(), &OpenToolCalls::default());
        let states: Vec<_> = statuses.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                ToolCallState::Resulted,
                ToolCallState::Errored,
                ToolCallState::Finalized
            ]
        );
        assert_eq!(statuses[0].result_message, Some(2));
        assert_eq!(statuses[1].result_message, Some(3));
        assert_eq!(statuses[2].call_message, 1);
    }

    #[test]
    fn open_calls_refine_unfinished_state() {
        let mut open = OpenToolCalls::new();
        open.start("c");
        assert_eq!(track(&history(), &open)[2].state, ToolCallState::Started);
        assert!(open.push_delta("c", "{\"pa").is_none());
        assert!(open.push_delta("c", "th\": 1}").is_some());
        assert_eq!(track(&history(), &open)[2].state, ToolCallState::Streaming);
        open.finalize("c");
        assert!(open.is_empty());
    }

    #[test]
    fn unresolved_lists_dangling_calls() {
        let dangling = unresolved(&history());
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].tool_call_id, "c");
    }

    #[test]
    fn state_settled_flags() {
        assert!(ToolCallState::Resulted.is_settled());
        assert!(ToolCallState::Errored.is_settled());
        assert!(!ToolCallState::Finalized.is_settled());
    }
}
