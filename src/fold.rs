//! The conversation fold shared by the stream reducer and the client projection.
//!
//! Both sides translate their own input (model events on the server, wire
//! messages on the client) into [`FoldEvent`]s and apply them to a [`Fold`].
//! Keeping a single state machine means the two views of a conversation can
//! only diverge if their adapters disagree, never because the merge rules do.
//!
//! Merge rules:
//! - text appends to a trailing assistant message whose content is a plain
//!   string and which is not an error; otherwise a new assistant message starts
//! - a started tool call is appended to a trailing assistant message (mixed
//!   content) or opens a new one
//! - tool calls are upserted by id in place; parts are never reordered
//! - each tool result is appended as its own tool message, at most once per id

use std::collections::{HashMap, HashSet};

use crate::types::{
    Content, Message, Metadata, Part, Role, ToolCallPart, ToolOutput, ToolResultPart,
};

/// A state transition of the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub enum FoldEvent {
    TextDelta {
        text: String,
    },
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
    },
    /// Latest parsed (possibly partial) arguments of an open call.
    ToolInput {
        tool_call_id: String,
        input: serde_json::Value,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        /// Falls back to the name recorded on the call when absent.
        tool_name: Option<String>,
        output: ToolOutput,
        is_error: bool,
    },
    /// A stream-terminal error rendered as an assistant message.
    Error { message: String, metadata: Metadata },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartIndex {
    message: usize,
    part: usize,
}

/// Append-only conversation log with an id index over its tool calls.
#[derive(Debug, Clone, Default)]
pub struct Fold {
    messages: Vec<Message>,
    calls: HashMap<String, PartIndex>,
    results: HashSet<String>,
}

impl Fold {
    /// Start folding on top of an existing history.
    pub fn new(history: Vec<Message>) -> Self {
        let mut fold = Self {
            messages: history,
            ..Default::default()
        };
        fold.reindex();
        fold
    }

    fn reindex(&mut self) {
        self.calls.clear();
        self.results.clear();
        for (message_index, message) in self.messages.iter().enumerate() {
            for (part_index, part) in message.content.parts().iter().enumerate() {
                match part {
                    // Later occurrences win, matching a backward search.
                    Part::ToolCall(call) => {
                        self.calls.insert(
                            call.tool_call_id.clone(),
                            PartIndex {
                                message: message_index,
                                part: part_index,
                            },
                        );
                    }
                    Part::ToolResult(result) => {
                        self.results.insert(result.tool_call_id.clone());
                    }
                    Part::Text { .. } => {}
                }
            }
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a call with this id has been recorded.
    pub fn has_call(&self, tool_call_id: &str) -> bool {
        self.calls.contains_key(tool_call_id)
    }

    /// Whether a result with this id has been recorded.
    pub fn has_result(&self, tool_call_id: &str) -> bool {
        self.results.contains(tool_call_id)
    }

    /// The recorded call with this id.
    pub fn call(&self, tool_call_id: &str) -> Option<&ToolCallPart> {
        let index = self.calls.get(tool_call_id)?;
        match self.messages.get(index.message)?.content.parts().get(index.part)? {
            Part::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    fn call_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolCallPart> {
        let index = *self.calls.get(tool_call_id)?;
        let parts = self.messages.get_mut(index.message)?.content.parts_mut()?;
        match parts.get_mut(index.part)? {
            Part::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    /// Append a message that did not come from the stream (e.g. user input).
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        let message_index = self.messages.len() - 1;
        // Index only the new message; earlier positions are unchanged.
        let parts: Vec<(usize, Part)> = self.messages[message_index]
            .content
            .parts()
            .iter()
            .cloned()
            .enumerate()
            .collect();
        for (part_index, part) in parts {
            match part {
                Part::ToolCall(call) => {
                    self.calls.insert(
                        call.tool_call_id,
                        PartIndex {
                            message: message_index,
                            part: part_index,
                        },
                    );
                }
                Part::ToolResult(result) => {
                    self.results.insert(result.tool_call_id);
                }
                Part::Text { .. } => {}
            }
        }
    }

    /// Update the metadata of the last message with the given role, looking
    /// only at messages from index `from` on.
    pub fn annotate_last(
        &mut self,
        role: Role,
        from: usize,
        annotate: impl FnOnce(&mut Metadata),
    ) -> bool {
        let tail = self.messages.get_mut(from..).unwrap_or_default();
        let Some(message) = tail.iter_mut().rev().find(|m| m.role == role) else {
            return false;
        };
        annotate(message.metadata.get_or_insert_with(Metadata::default));
        true
    }

    /// Apply one event. Returns `true` when the log changed.
    pub fn apply(&mut self, event: FoldEvent) -> bool {
        match event {
            FoldEvent::TextDelta { text } => self.append_text(text),
            FoldEvent::ToolCallStart {
                tool_call_id,
                tool_name,
            } => self.start_call(tool_call_id, tool_name),
            FoldEvent::ToolInput {
                tool_call_id,
                input,
            } => self.update_input(&tool_call_id, input),
            FoldEvent::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => self.finalize_call(tool_call_id, tool_name, input),
            FoldEvent::ToolResult {
                tool_call_id,
                tool_name,
                output,
                is_error,
            } => self.record_result(tool_call_id, tool_name, output, is_error),
            FoldEvent::Error { message, metadata } => {
                self.messages
                    .push(Message::assistant(message).with_metadata(metadata));
                true
            }
        }
    }

    /// The trailing assistant message, if it can take more content.
    fn open_assistant(&mut self) -> Option<&mut Message> {
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant && !m.is_error())
    }

    fn append_text(&mut self, text: String) -> bool {
        if text.is_empty() {
            return false;
        }
        if let Some(Message {
            content: Content::Text(existing),
            ..
        }) = self.open_assistant()
        {
            existing.push_str(&text);
            return true;
        }
        self.messages.push(Message::assistant(text));
        true
    }

    fn start_call(&mut self, tool_call_id: String, tool_name: String) -> bool {
        if self.calls.contains_key(&tool_call_id) {
            tracing::debug!(tool_call_id = %tool_call_id, "ignoring repeated tool call start");
            return false;
        }
        let part = Part::ToolCall(ToolCallPart::placeholder(tool_call_id.clone(), tool_name));
        let message_count = self.messages.len();
        let index = match self.open_assistant() {
            Some(message) => PartIndex {
                message: message_count - 1,
                part: message.content.push_part(part),
            },
            None => {
                self.messages.push(Message::assistant_parts(vec![part]));
                PartIndex {
                    message: message_count,
                    part: 0,
                }
            }
        };
        self.calls.insert(tool_call_id, index);
        true
    }

    fn update_input(&mut self, tool_call_id: &str, input: serde_json::Value) -> bool {
        match self.call_mut(tool_call_id) {
            Some(call) if call.input != input => {
                call.input = input;
                true
            }
            _ => false,
        }
    }

    fn finalize_call(
        &mut self,
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
    ) -> bool {
        if let Some(call) = self.call_mut(&tool_call_id) {
            let changed = call.input != input || call.tool_name != tool_name;
            call.input = input;
            call.tool_name = tool_name;
            return changed;
        }
        let index = PartIndex {
            message: self.messages.len(),
            part: 0,
        };
        self.messages
            .push(Message::assistant_parts(vec![Part::ToolCall(ToolCallPart::new(
                tool_call_id.clone(),
                tool_name,
                input,
            ))]));
        self.calls.insert(tool_call_id, index);
        true
    }

    fn record_result(
        &mut self,
        tool_call_id: String,
        tool_name: Option<String>,
        output: ToolOutput,
        is_error: bool,
    ) -> bool {
        if self.results.contains(&tool_call_id) {
            tracing::debug!(tool_call_id = %tool_call_id, "ignoring duplicate tool result");
            return false;
        }
        let tool_name = tool_name
            .or_else(|| self.call(&tool_call_id).map(|call| call.tool_name.clone()))
            .unwrap_or_default();
        self.messages.push(Message::tool_result(ToolResultPart::new(
            tool_call_id.clone(),
            tool_name,
            output,
            is_error,
        )));
        self.results.insert(tool_call_id);
        true
    }
}
