//! Client-side reconstruction of the conversation from transport messages.
//!
//! The orchestrator encodes every applied [`FoldEvent`] as one
//! [`WireMessage`]; the client decodes each message back into the same
//! vocabulary and applies it to its own [`Fold`]. Both ends therefore share
//! the merge rules, and the projection converges to the reducer's log.

pub mod wire;

pub use wire::{ChunkType, WireEnvelope, WireMessage};

use serde::Deserialize;

use crate::fold::{Fold, FoldEvent};
use crate::types::{FinishReason, Message, Metadata};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallContent {
    tool_call_id: String,
    tool_name: String,
    #[serde(default)]
    input: serde_json::Value,
}

/// Encode an applied transition as a transport message.
pub fn encode(event: &FoldEvent) -> WireMessage {
    match event {
        FoldEvent::TextDelta { text } => WireMessage::ChatResponseChunk {
            message_type: ChunkType::Text,
            content: serde_json::Value::String(text.clone()),
            metadata: None,
        },
        FoldEvent::ToolCallStart {
            tool_call_id,
            tool_name,
        } => WireMessage::ChatResponseChunk {
            message_type: ChunkType::ToolInputStart,
            content: serde_json::json!({
                "toolCallId": tool_call_id,
                "toolName": tool_name,
            }),
            metadata: None,
        },
        FoldEvent::ToolInput {
            tool_call_id,
            input,
        } => WireMessage::ChatToolUpdate {
            tool_call_id: tool_call_id.clone(),
            input: input.clone(),
        },
        FoldEvent::ToolCall {
            tool_call_id,
            tool_name,
            input,
        } => WireMessage::ChatResponseChunk {
            message_type: ChunkType::ToolCall,
            content: serde_json::json!({
                "toolCallId": tool_call_id,
                "toolName": tool_name,
                "input": input,
            }),
            metadata: None,
        },
        FoldEvent::ToolResult {
            tool_call_id,
            tool_name,
            output,
            is_error,
        } => WireMessage::ChatToolResult {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
            content: output.clone(),
            is_error: *is_error,
        },
        FoldEvent::Error { message, metadata } => WireMessage::ChatResponseChunk {
            message_type: ChunkType::Error,
            content: serde_json::Value::String(message.clone()),
            metadata: Some(metadata.clone()),
        },
    }
}

/// Decode a content-bearing transport message. Lifecycle messages and
/// malformed chunks yield `None`.
pub fn decode(message: &WireMessage) -> Option<FoldEvent> {
    match message {
        WireMessage::ChatResponseChunk {
            message_type,
            content,
            metadata,
        } => decode_chunk(*message_type, content, metadata.as_ref()),
        WireMessage::ChatToolUpdate {
            tool_call_id,
            input,
        } => Some(FoldEvent::ToolInput {
            tool_call_id: tool_call_id.clone(),
            input: input.clone(),
        }),
        WireMessage::ChatToolResult {
            tool_call_id,
            tool_name,
            content,
            is_error,
        } => Some(FoldEvent::ToolResult {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
            output: content.clone(),
            is_error: *is_error,
        }),
        WireMessage::ChatStreamStart
        | WireMessage::ChatStreamEnd { .. }
        | WireMessage::ChatError { .. }
        | WireMessage::ChatStopped => None,
    }
}

fn decode_chunk(
    message_type: ChunkType,
    content: &serde_json::Value,
    metadata: Option<&Metadata>,
) -> Option<FoldEvent> {
    match message_type {
        ChunkType::Text => content.as_str().map(|text| FoldEvent::TextDelta {
            text: text.to_string(),
        }),
        ChunkType::ToolInputStart => {
            tool_call_content(content).map(|call| FoldEvent::ToolCallStart {
                tool_call_id: call.tool_call_id,
                tool_name: call.tool_name,
            })
        }
        ChunkType::ToolCall => tool_call_content(content).map(|call| FoldEvent::ToolCall {
            tool_call_id: call.tool_call_id,
            tool_name: call.tool_name,
            input: call.input,
        }),
        ChunkType::Error => {
            let message = match content {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            let mut metadata = metadata.cloned().unwrap_or_else(Metadata::now);
            metadata.is_error = true;
            Some(FoldEvent::Error { message, metadata })
        }
    }
}

fn tool_call_content(content: &serde_json::Value) -> Option<ToolCallContent> {
    match serde_json::from_value::<ToolCallContent>(content.clone()) {
        Ok(call) => Some(call),
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed tool call chunk");
            None
        }
    }
}

/// Assigns sequence numbers to outgoing transport messages of one request.
#[derive(Debug, Clone)]
pub struct WireEncoder {
    request_id: String,
    seq: u64,
}

impl WireEncoder {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            seq: 0,
        }
    }

    /// Wrap a message in the next envelope.
    pub fn envelope(&mut self, message: WireMessage) -> WireEnvelope {
        self.seq += 1;
        WireEnvelope {
            request_id: self.request_id.clone(),
            seq: self.seq,
            message,
        }
    }

    /// Encode a transition in the next envelope.
    pub fn encode(&mut self, event: &FoldEvent) -> WireEnvelope {
        self.envelope(encode(event))
    }
}

/// Stream state as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProjectionState {
    #[default]
    Idle,
    Streaming,
    Finished(Option<FinishReason>),
    Errored(String),
    /// Stopped by the user; distinct from a failure.
    Stopped,
}

/// The client's copy of the conversation.
#[derive(Debug, Clone, Default)]
pub struct ClientProjection {
    fold: Fold,
    state: ProjectionState,
    last_seen: Option<(String, u64)>,
    error_recorded: bool,
}

impl ClientProjection {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            fold: Fold::new(history),
            ..Default::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.fold.messages()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.fold.into_messages()
    }

    pub fn state(&self) -> &ProjectionState {
        &self.state
    }

    /// Append a locally authored message, e.g. the user's own input.
    pub fn push(&mut self, message: Message) {
        self.fold.push(message);
    }

    /// Apply an envelope, ignoring any already seen. Returns whether the
    /// conversation changed.
    pub fn apply_envelope(&mut self, envelope: WireEnvelope) -> bool {
        if let Some((request_id, seq)) = &self.last_seen {
            if *request_id == envelope.request_id && envelope.seq <= *seq {
                tracing::trace!(seq = envelope.seq, "skipping redelivered wire message");
                return false;
            }
        }
        self.last_seen = Some((envelope.request_id, envelope.seq));
        self.apply(envelope.message)
    }

    /// Apply one transport message. Returns whether the conversation changed.
    pub fn apply(&mut self, message: WireMessage) -> bool {
        match &message {
            WireMessage::ChatStreamStart => {
                self.state = ProjectionState::Streaming;
                self.error_recorded = false;
                return false;
            }
            WireMessage::ChatStreamEnd { finish_reason } => {
                self.state = ProjectionState::Finished(*finish_reason);
                return false;
            }
            WireMessage::ChatStopped => {
                self.state = ProjectionState::Stopped;
                return false;
            }
            WireMessage::ChatError { message } => {
                self.state = ProjectionState::Errored(message.clone());
                if self.error_recorded {
                    return false;
                }
                self.error_recorded = true;
                return self.fold.apply(FoldEvent::Error {
                    message: message.clone(),
                    metadata: Metadata {
                        is_error: true,
                        ..Metadata::now()
                    },
                });
            }
            _ => {}
        }

        let Some(event) = decode(&message) else {
            return false;
        };
        if matches!(event, FoldEvent::Error { .. }) {
            self.error_recorded = true;
        }
        self.fold.apply(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Content, ToolOutput};
    use pretty_assertions::assert_eq;

    #[test]
    fn repeated_tool_result_is_a_no_op() {
        let mut projection = ClientProjection::default();
        projection.apply(WireMessage::ChatStreamStart);
        projection.apply(encode(&FoldEvent::ToolCall {
            tool_call_id: "c".into(),
            tool_name: "read".into(),
            input: serde_json::json!({}),
        }));
        let result = WireMessage::ChatToolResult {
            tool_call_id: "c".into(),
            tool_name: None,
            content: ToolOutput::Text("ok".into()),
            is_error: false,
        };
        assert!(projection.apply(result.clone()));
        assert!(!projection.apply(result));
        assert_eq!(projection.messages().len(), 2);
        assert_eq!(projection.messages()[1].tool_results()[0].tool_name, "read");
    }

    #[test]
    fn redelivered_envelopes_are_skipped() {
        let mut encoder = WireEncoder::new("r1");
        let first = encoder.encode(&FoldEvent::TextDelta { text: "a".into() });
        let second = encoder.encode(&FoldEvent::TextDelta { text: "b".into() });
        let mut projection = ClientProjection::default();
        assert!(projection.apply_envelope(first.clone()));
        assert!(!projection.apply_envelope(first));
        assert!(projection.apply_envelope(second.clone()));
        assert!(!projection.apply_envelope(second));
        assert_eq!(projection.messages()[0].content, Content::Text("ab".into()));
    }

    #[test]
    fn chat_error_without_chunk_records_message() {
        let mut projection = ClientProjection::default();
        projection.apply(WireMessage::ChatStreamStart);
        assert!(projection.apply(WireMessage::ChatError {
            message: "overloaded".into(),
        }));
        assert_eq!(
            projection.state(),
            &ProjectionState::Errored("overloaded".into())
        );
        assert!(projection.messages()[0].is_error());
    }

    #[test]
    fn chat_error_after_error_chunk_does_not_duplicate() {
        let mut projection = ClientProjection::default();
        projection.apply(WireMessage::ChatStreamStart);
        projection.apply(encode(&FoldEvent::Error {
            message: "boom".into(),
            metadata: Metadata {
                is_error: true,
                ..Default::default()
            },
        }));
        assert!(!projection.apply(WireMessage::ChatError {
            message: "boom".into(),
        }));
        assert_eq!(projection.messages().len(), 1);
    }

    #[test]
    fn stopped_is_distinct_from_error() {
        let mut projection = ClientProjection::default();
        projection.apply(WireMessage::ChatStreamStart);
        projection.apply(encode(&FoldEvent::TextDelta { text: "par".into() }));
        projection.apply(WireMessage::ChatStopped);
        assert_eq!(projection.state(), &ProjectionState::Stopped);
        assert_eq!(projection.messages()[0].text(), "par");
    }

    #[test]
    fn malformed_tool_chunk_is_ignored() {
        let mut projection = ClientProjection::default();
        assert!(!projection.apply(WireMessage::ChatResponseChunk {
            message_type: ChunkType::ToolCall,
            content: serde_json::json!({"name": "missing id"}),
            metadata: None,
        }));
        assert!(projection.messages().is_empty());
    }
}
