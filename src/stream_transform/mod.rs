//! Stream transformations applied to model event streams.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::WeftError;
use crate::model::EventStream;
use crate::tools::{ToolExecutionContext, ToolSet};
use crate::types::{StreamEvent, ToolOutput};

/// Trait for transforming a stream of generation events.
pub trait StreamTransform: Send + Sync {
    /// Transform the stream.
    fn transform(&self, stream: EventStream) -> EventStream;
}

/// Fail the stream when the model goes quiet for too long.
pub struct IdleTimeoutTransform {
    idle: Duration,
}

impl IdleTimeoutTransform {
    pub fn new(idle: Duration) -> Self {
        Self { idle }
    }
}

impl StreamTransform for IdleTimeoutTransform {
    fn transform(&self, stream: EventStream) -> EventStream {
        let idle = self.idle;
        let transformed = async_stream::stream! {
            let mut inner = std::pin::pin!(stream);
            loop {
                match tokio::time::timeout(idle, inner.next()).await {
                    Ok(Some(Ok(event))) => {
                        let terminal = event.is_terminal();
                        yield Ok(event);
                        if terminal {
                            break;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        yield Err(e);
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(idle_ms = idle.as_millis() as u64, "model stream went idle");
                        yield Err(WeftError::Stream(format!(
                            "no events received for {}ms",
                            idle.as_millis()
                        )));
                        break;
                    }
                }
            }
        };
        Box::pin(transformed)
    }
}

/// Run registered tools as soon as the model finalizes a call.
///
/// The call is forwarded first, then the tool's outcome follows as a
/// `tool-result` or `tool-error` event. Calls naming unregistered tools pass
/// through untouched. Execution races the cancellation token; if it fires
/// first the stream ends with [`WeftError::Cancelled`].
///
/// Each call id runs at most once: repeated `tool-call` events for an id are
/// forwarded without executing again.
pub struct ToolExecutionTransform {
    tools: ToolSet,
    working_directory: PathBuf,
    session_id: String,
    cancel: CancellationToken,
    executed: HashSet<String>,
}

impl ToolExecutionTransform {
    pub fn new(
        tools: ToolSet,
        working_directory: PathBuf,
        session_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tools,
            working_directory,
            session_id: session_id.into(),
            cancel,
            executed: HashSet::new(),
        }
    }

    /// Mark call ids that already have a result; they are never run.
    pub fn with_executed(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.executed.extend(ids);
        self
    }
}

impl StreamTransform for ToolExecutionTransform {
    fn transform(&self, stream: EventStream) -> EventStream {
        let tools = self.tools.clone();
        let working_directory = self.working_directory.clone();
        let session_id = self.session_id.clone();
        let cancel = self.cancel.clone();
        let mut executed = self.executed.clone();
        let transformed = async_stream::stream! {
            let mut inner = std::pin::pin!(stream);
            while let Some(item) = inner.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                let StreamEvent::ToolCall { id, tool_name, input } = &event else {
                    yield Ok(event);
                    continue;
                };
                if !tools.contains(tool_name) {
                    yield Ok(event);
                    continue;
                }
                if !executed.insert(id.clone()) {
                    tracing::debug!(tool_call_id = %id, "tool call repeated, not running again");
                    yield Ok(event);
                    continue;
                }

                let (id, tool_name, input) = (id.clone(), tool_name.clone(), input.clone());
                yield Ok(event);

                let ctx = ToolExecutionContext {
                    working_directory: working_directory.clone(),
                    session_id: session_id.clone(),
                    tool_call_id: id.clone(),
                    cancel: cancel.child_token(),
                };
                tracing::debug!(tool_call_id = %id, tool = %tool_name, "executing tool");
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(WeftError::Cancelled),
                    result = tools.execute(&tool_name, &input, &ctx) => result,
                };
                match outcome {
                    Ok(value) => yield Ok(StreamEvent::ToolResult {
                        id,
                        tool_name,
                        output: ToolOutput::from_value(value),
                    }),
                    Err(e) if e.is_cancellation() => {
                        yield Err(e);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(tool_call_id = %id, tool = %tool_name, error = %e, "tool failed");
                        yield Ok(StreamEvent::ToolError {
                            id,
                            tool_name,
                            output: ToolOutput::Error(e.to_string()),
                        });
                    }
                }
            }
        };
        Box::pin(transformed)
    }
}
