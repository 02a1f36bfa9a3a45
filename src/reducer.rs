//! Stream reducer: folds model events into the conversation log.
//!
//! [`StreamReducer::apply`] translates one [`StreamEvent`] into the shared
//! [`FoldEvent`] vocabulary and applies it; [`StreamReducer::drive`] consumes a
//! whole event stream, checking the request's cancellation token before every
//! event and reporting each state change to an observer.

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{describe_error, remediation_actions, WeftError};
use crate::fold::{Fold, FoldEvent};
use crate::lifecycle::{self, OpenToolCalls, ToolCallStatus};
use crate::types::{ErrorPayload, FinishReason, Message, Metadata, StreamEvent};

/// Identity stamped on error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub session_id: String,
    pub request_id: String,
}

impl RequestIdentity {
    /// Fresh session and request ids.
    pub fn generate() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// What one event did to the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Continue,
    Finished(FinishReason),
    Errored(String),
    Aborted,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The transition applied, when the log changed.
    pub change: Option<FoldEvent>,
    pub control: Control,
}

impl Applied {
    fn unchanged(control: Control) -> Self {
        Self {
            change: None,
            control,
        }
    }
}

/// How a reduction ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ReduceStatus {
    Finished(FinishReason),
    /// A stream-terminal error was recorded as the last message.
    Errored(String),
    /// Stopped by the cancellation token or an `abort` event.
    Aborted,
}

/// Final history plus how the stream ended.
#[derive(Debug, Clone)]
pub struct ReduceOutcome {
    pub messages: Vec<Message>,
    pub status: ReduceStatus,
}

/// Incremental state of one request's conversation log.
#[derive(Debug, Clone)]
pub struct StreamReducer {
    fold: Fold,
    open: OpenToolCalls,
    identity: RequestIdentity,
}

impl StreamReducer {
    pub fn new(history: Vec<Message>, identity: RequestIdentity) -> Self {
        Self {
            fold: Fold::new(history),
            open: OpenToolCalls::new(),
            identity,
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.fold.messages()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.fold.into_messages()
    }

    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    pub fn fold(&self) -> &Fold {
        &self.fold
    }

    pub(crate) fn fold_mut(&mut self) -> &mut Fold {
        &mut self.fold
    }

    /// Lifecycle state of every call in the log.
    pub fn tool_calls(&self) -> Vec<ToolCallStatus> {
        lifecycle::track(self.fold.messages(), &self.open)
    }

    /// Apply one event.
    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        match event {
            StreamEvent::TextDelta { text } => self.fold_change(FoldEvent::TextDelta { text }),
            StreamEvent::ToolInputStart { id, tool_name } => {
                self.open.start(&id);
                self.fold_change(FoldEvent::ToolCallStart {
                    tool_call_id: id,
                    tool_name,
                })
            }
            StreamEvent::ToolInputDelta { id, delta } => match self.open.push_delta(&id, &delta) {
                Some(input) => self.fold_change(FoldEvent::ToolInput {
                    tool_call_id: id,
                    input,
                }),
                None => Applied::unchanged(Control::Continue),
            },
            StreamEvent::ToolCall {
                id,
                tool_name,
                input,
            } => {
                self.open.finalize(&id);
                self.fold_change(FoldEvent::ToolCall {
                    tool_call_id: id,
                    tool_name,
                    input,
                })
            }
            StreamEvent::ToolResult {
                id,
                tool_name,
                output,
            } => self.fold_change(FoldEvent::ToolResult {
                tool_call_id: id,
                tool_name: Some(tool_name),
                output,
                is_error: false,
            }),
            StreamEvent::ToolError {
                id,
                tool_name,
                output,
            } => self.fold_change(FoldEvent::ToolResult {
                tool_call_id: id,
                tool_name: Some(tool_name),
                output,
                is_error: true,
            }),
            StreamEvent::Error { error } => self.record_error(&error),
            StreamEvent::Finish { reason } => {
                self.open.clear();
                Applied::unchanged(Control::Finished(reason))
            }
            StreamEvent::Abort => Applied::unchanged(Control::Aborted),
        }
    }

    fn fold_change(&mut self, event: FoldEvent) -> Applied {
        let change = self.fold.apply(event.clone()).then_some(event);
        Applied {
            change,
            control: Control::Continue,
        }
    }

    fn record_error(&mut self, error: &ErrorPayload) -> Applied {
        let message = describe_error(error);
        let event = FoldEvent::Error {
            message: message.clone(),
            metadata: self.error_metadata(&message),
        };
        self.open.clear();
        self.fold.apply(event.clone());
        Applied {
            change: Some(event),
            control: Control::Errored(message),
        }
    }

    fn error_metadata(&self, message: &str) -> Metadata {
        Metadata {
            is_error: true,
            session_id: Some(self.identity.session_id.clone()),
            request_id: Some(self.identity.request_id.clone()),
            actions: remediation_actions(message),
            ..Metadata::now()
        }
    }

    /// Consume `events` until a terminal event, the end of the stream, or
    /// cancellation.
    ///
    /// `on_change` runs after every event that changed the log, with the new
    /// snapshot and the transition that produced it.
    pub async fn drive<S>(
        &mut self,
        events: S,
        cancel: &CancellationToken,
        mut on_change: impl FnMut(&[Message], &FoldEvent),
    ) -> ReduceStatus
    where
        S: Stream<Item = Result<StreamEvent, WeftError>>,
    {
        let mut events = std::pin::pin!(events);
        loop {
            if cancel.is_cancelled() {
                return ReduceStatus::Aborted;
            }
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ReduceStatus::Aborted,
                next = events.next() => next,
            };
            if cancel.is_cancelled() {
                return ReduceStatus::Aborted;
            }

            let event = match next {
                None => {
                    tracing::debug!(
                        request_id = %self.identity.request_id,
                        "stream ended without a finish event"
                    );
                    self.open.clear();
                    return ReduceStatus::Finished(FinishReason::Other);
                }
                Some(Ok(event)) => event,
                Some(Err(err)) if err.is_cancellation() => return ReduceStatus::Aborted,
                Some(Err(err)) => StreamEvent::Error {
                    error: ErrorPayload::from(&err),
                },
            };

            let applied = self.apply(event);
            if let Some(change) = &applied.change {
                on_change(self.fold.messages(), change);
            }
            match applied.control {
                Control::Continue => {}
                Control::Finished(reason) => return ReduceStatus::Finished(reason),
                Control::Errored(message) => return ReduceStatus::Errored(message),
                Control::Aborted => return ReduceStatus::Aborted,
            }
        }
    }
}

/// Reduce a complete event stream onto `history` under a freshly generated
/// session and request id.
///
/// `on_snapshot` runs after every event that changed the log.
pub async fn reduce<S>(
    history: Vec<Message>,
    events: S,
    cancel: &CancellationToken,
    mut on_snapshot: impl FnMut(&[Message]),
) -> ReduceOutcome
where
    S: Stream<Item = Result<StreamEvent, WeftError>>,
{
    let mut reducer = StreamReducer::new(history, RequestIdentity::generate());
    let status = reducer
        .drive(events, cancel, |messages, _| on_snapshot(messages))
        .await;
    ReduceOutcome {
        messages: reducer.into_messages(),
        status,
    }
}
