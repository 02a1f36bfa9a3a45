//! Discrete transport messages between the orchestrator and a client.

use serde::{Deserialize, Serialize};

use crate::types::{FinishReason, Metadata, ToolOutput};

/// Kind of content carried by a [`WireMessage::ChatResponseChunk`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkType {
    /// `content` is a text fragment.
    Text,
    /// `content` is `{toolCallId, toolName}` of a call that started streaming.
    ToolInputStart,
    /// `content` is `{toolCallId, toolName, input}` of a finalized call.
    ToolCall,
    /// `content` is the rendered error text; `metadata` carries the error flag.
    Error,
}

/// One transport message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    ChatStreamStart,
    #[serde(rename_all = "camelCase")]
    ChatResponseChunk {
        message_type: ChunkType,
        content: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    #[serde(rename_all = "camelCase")]
    ChatToolUpdate {
        tool_call_id: String,
        input: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    ChatToolResult {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        content: ToolOutput,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename_all = "camelCase")]
    ChatStreamEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
    },
    ChatError { message: String },
    ChatStopped,
}

/// A wire message with its position in the request's stream.
///
/// The transport delivers envelopes in order but possibly more than once;
/// `seq` lets the receiver drop repeats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    pub request_id: String,
    pub seq: u64,
    pub message: WireMessage,
}
