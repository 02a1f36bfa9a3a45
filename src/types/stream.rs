//! Streaming event vocabulary emitted by the model collaborator.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ToolOutput;
use crate::error::WeftError;

/// One generation event, in the order the model produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    TextDelta { text: String },
    /// A tool call started streaming its arguments.
    #[serde(rename_all = "camelCase")]
    ToolInputStart { id: String, tool_name: String },
    /// Raw argument characters for an open tool call.
    ToolInputDelta { id: String, delta: String },
    /// The model finalized a tool call.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        id: String,
        tool_name: String,
        output: ToolOutput,
    },
    #[serde(rename_all = "camelCase")]
    ToolError {
        id: String,
        tool_name: String,
        output: ToolOutput,
    },
    /// Stream-terminal failure reported by the model.
    Error { error: ErrorPayload },
    Finish { reason: FinishReason },
    /// The model side stopped the stream on request.
    Abort,
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self::Finish { reason }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Finish { .. } | Self::Abort)
    }
}

/// Why a generation step stopped.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

/// Error value carried by an `error` event.
///
/// Model backends report failures as arbitrary JSON (strings, objects with
/// `message`/`type`, `null`) or as native errors; both are kept so the
/// displayed text can be derived from whichever shape arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum ErrorPayload {
    /// Message of a native error.
    Native(String),
    Value(serde_json::Value),
}

impl From<serde_json::Value> for ErrorPayload {
    fn from(value: serde_json::Value) -> Self {
        ErrorPayload::Value(value)
    }
}

impl From<ErrorPayload> for serde_json::Value {
    fn from(payload: ErrorPayload) -> Self {
        match payload {
            ErrorPayload::Native(message) => serde_json::Value::String(message),
            ErrorPayload::Value(value) => value,
        }
    }
}

impl From<&WeftError> for ErrorPayload {
    fn from(error: &WeftError) -> Self {
        ErrorPayload::Native(error.to_string())
    }
}
