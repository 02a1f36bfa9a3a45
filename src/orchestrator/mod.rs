//! Request orchestration: repair, drive the model step by step, settle.
//!
//! One request is a sequence of model round trips ("steps"). Each step
//! submits the repaired log, folds the model's events into it and runs any
//! tools the model calls. A step that produced tool results for the
//! orchestrator's own tools leads to another step, up to
//! [`WeftConfig::max_steps`].

pub mod observer;
pub mod outcome;

pub use observer::{Observer, RecordingObserver};
pub use outcome::{RequestOutcome, RequestStatus};

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cancel::RequestSlot;
use crate::config::WeftConfig;
use crate::error::{Result, WeftError};
use crate::fold::FoldEvent;
use crate::lifecycle;
use crate::model::{EventStream, ModelClient, ModelRequest};
use crate::projection::{WireEncoder, WireMessage};
use crate::reducer::{Control, ReduceStatus, RequestIdentity, StreamReducer};
use crate::repair::{repair_with_report, RepairReport};
use crate::stream_transform::{IdleTimeoutTransform, StreamTransform, ToolExecutionTransform};
use crate::tools::ToolSet;
use crate::types::{ErrorPayload, FinishReason, Message, Role, StreamEvent, ToolOutput};

/// Drives requests of one conversation session against an injected model
/// and tool set.
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    tools: ToolSet,
    config: WeftConfig,
    slot: RequestSlot,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("model", &self.model.name())
            .field("tools", &self.tools)
            .field("config", &self.config)
            .field("session_id", &self.slot.session_id())
            .finish()
    }
}

/// How one step ended.
enum StepEnd {
    /// Tool results were recorded; the model should see them.
    ToolsRan(FinishReason),
    Finished(FinishReason),
    Failed(String),
    Cancelled,
}

impl Orchestrator {
    /// Create an orchestrator for a fresh session.
    pub fn new(model: Arc<dyn ModelClient>, tools: ToolSet, config: WeftConfig) -> Self {
        Self::with_session(model, tools, config, Uuid::new_v4().to_string())
    }

    /// Create an orchestrator for an existing session.
    pub fn with_session(
        model: Arc<dyn ModelClient>,
        tools: ToolSet,
        config: WeftConfig,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            model,
            tools,
            config,
            slot: RequestSlot::new(session_id),
        }
    }

    pub fn session_id(&self) -> &str {
        self.slot.session_id()
    }

    pub fn config(&self) -> &WeftConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Handle for cancelling from another task.
    pub fn slot(&self) -> RequestSlot {
        self.slot.clone()
    }

    /// Cancel the in-flight request. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    /// Run one request: `input` appended to `history`, then as many model
    /// steps as the tool loop needs.
    ///
    /// Fails only when another request of this session is in flight; model
    /// failures and cancellation are reported in the outcome.
    pub async fn run(
        &self,
        history: Vec<Message>,
        input: Message,
        observer: &mut dyn Observer,
    ) -> Result<RequestOutcome> {
        let guard = self.slot.acquire()?;
        let cancel = guard.token().clone();
        let identity = RequestIdentity {
            session_id: self.slot.session_id().to_string(),
            request_id: guard.request_id().to_string(),
        };
        let started = Instant::now();
        tracing::info!(
            session_id = %identity.session_id,
            request_id = %identity.request_id,
            model = self.model.name(),
            "request started"
        );

        let mut report = RepairReport::default();
        let history = if self.config.repair_before_submit {
            let (repaired, dropped) = repair_with_report(&history);
            report += dropped;
            repaired
        } else {
            history
        };

        let mut encoder = WireEncoder::new(identity.request_id.clone());
        let mut reducer = StreamReducer::new(history, identity.clone());
        let request_start = reducer.messages().len();
        reducer.fold_mut().push(input);
        observer.on_snapshot(reducer.messages());
        observer.on_wire(encoder.envelope(WireMessage::ChatStreamStart));

        let mut steps = 0usize;
        let status = loop {
            steps += 1;
            tracing::debug!(request_id = %identity.request_id, step = steps, "starting step");
            let end = self
                .step(&mut reducer, &mut encoder, observer, &cancel, &mut report)
                .await;
            match end {
                StepEnd::ToolsRan(reason) if steps >= self.config.max_steps => {
                    tracing::warn!(
                        request_id = %identity.request_id,
                        steps,
                        last_reason = %reason,
                        "step limit reached with tool results pending"
                    );
                    break RequestStatus::Completed(FinishReason::Other);
                }
                StepEnd::ToolsRan(_) => continue,
                StepEnd::Finished(reason) => break RequestStatus::Completed(reason),
                StepEnd::Failed(message) => break RequestStatus::Failed(message),
                StepEnd::Cancelled => break RequestStatus::Cancelled,
            }
        };

        let closing = match &status {
            RequestStatus::Completed(reason) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                if reducer
                    .fold_mut()
                    .annotate_last(Role::Assistant, request_start, |metadata| {
                        metadata.duration_ms = Some(duration_ms)
                    })
                {
                    observer.on_snapshot(reducer.messages());
                }
                WireMessage::ChatStreamEnd {
                    finish_reason: Some(*reason),
                }
            }
            RequestStatus::Failed(message) => WireMessage::ChatError {
                message: message.clone(),
            },
            RequestStatus::Cancelled => WireMessage::ChatStopped,
        };
        observer.on_wire(encoder.envelope(closing));

        tracing::info!(
            session_id = %identity.session_id,
            request_id = %identity.request_id,
            steps,
            status = ?status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request settled"
        );
        drop(guard);

        Ok(RequestOutcome {
            session_id: identity.session_id,
            request_id: identity.request_id,
            messages: reducer.into_messages(),
            status,
            repair: report,
            steps,
        })
    }

    async fn step(
        &self,
        reducer: &mut StreamReducer,
        encoder: &mut WireEncoder,
        observer: &mut dyn Observer,
        cancel: &CancellationToken,
        report: &mut RepairReport,
    ) -> StepEnd {
        let messages = if self.config.repair_before_submit {
            let (repaired, dropped) = repair_with_report(reducer.messages());
            *report += dropped;
            repaired
        } else {
            reducer.messages().to_vec()
        };
        let request = ModelRequest {
            system_prompt: self.config.system_prompt.clone(),
            messages,
            tools: self.tools.schemas(),
            cancel: cancel.clone(),
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StepEnd::Cancelled,
            opened = self.model.stream(request) => opened,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(err) if err.is_cancellation() => return StepEnd::Cancelled,
            Err(err) => return self.record_failure(reducer, encoder, observer, &err),
        };
        let answered = reducer
            .messages()
            .iter()
            .flat_map(|m| m.tool_results())
            .map(|r| r.tool_call_id.clone())
            .collect::<Vec<_>>();
        let stream = self.prepare_stream(stream, answered, cancel.clone());

        let step_start = reducer.messages().len();
        let mut local_results = 0usize;
        let tools = &self.tools;
        let status = reducer
            .drive(stream, cancel, |messages, change| {
                if let FoldEvent::ToolResult {
                    tool_name: Some(name),
                    ..
                } = change
                {
                    if tools.contains(name) {
                        local_results += 1;
                    }
                }
                observer.on_snapshot(messages);
                observer.on_wire(encoder.encode(change));
            })
            .await;

        match status {
            ReduceStatus::Finished(reason) => {
                local_results += self.resolve_unknown_tools(reducer, encoder, observer, step_start);
                if local_results > 0 {
                    StepEnd::ToolsRan(reason)
                } else {
                    StepEnd::Finished(reason)
                }
            }
            ReduceStatus::Errored(message) => StepEnd::Failed(message),
            ReduceStatus::Aborted => StepEnd::Cancelled,
        }
    }

    /// Wrap the raw model stream: idle timeout first, so time spent in tools
    /// does not count as model silence.
    fn prepare_stream(
        &self,
        stream: EventStream,
        answered: Vec<String>,
        cancel: CancellationToken,
    ) -> EventStream {
        let stream = match self.config.stream_idle_timeout() {
            Some(idle) => IdleTimeoutTransform::new(idle).transform(stream),
            None => stream,
        };
        ToolExecutionTransform::new(
            self.tools.clone(),
            self.config.working_directory.clone(),
            self.slot.session_id(),
            cancel,
        )
        .with_executed(answered)
        .transform(stream)
    }

    /// Give every call of this step that names an unregistered tool and got
    /// no result from the model an error result. Returns how many were added.
    fn resolve_unknown_tools(
        &self,
        reducer: &mut StreamReducer,
        encoder: &mut WireEncoder,
        observer: &mut dyn Observer,
        step_start: usize,
    ) -> usize {
        let pending: Vec<_> = lifecycle::unresolved(reducer.messages())
            .into_iter()
            .filter(|status| status.call_message >= step_start)
            .filter(|status| !self.tools.contains(&status.tool_name))
            .collect();
        let mut added = 0usize;
        for status in pending {
            tracing::warn!(
                tool_call_id = %status.tool_call_id,
                tool = %status.tool_name,
                "model called an unknown tool"
            );
            let error = WeftError::ToolNotFound(status.tool_name.clone());
            let applied = reducer.apply(StreamEvent::ToolError {
                id: status.tool_call_id,
                tool_name: status.tool_name,
                output: ToolOutput::Error(error.to_string()),
            });
            if let Some(change) = applied.change {
                observer.on_snapshot(reducer.messages());
                observer.on_wire(encoder.encode(&change));
                added += 1;
            }
        }
        added
    }

    fn record_failure(
        &self,
        reducer: &mut StreamReducer,
        encoder: &mut WireEncoder,
        observer: &mut dyn Observer,
        err: &WeftError,
    ) -> StepEnd {
        tracing::debug!(error = %err, "model request failed");
        let applied = reducer.apply(StreamEvent::Error {
            error: ErrorPayload::from(err),
        });
        if let Some(change) = &applied.change {
            observer.on_snapshot(reducer.messages());
            observer.on_wire(encoder.encode(change));
        }
        match applied.control {
            Control::Errored(message) => StepEnd::Failed(message),
            _ => StepEnd::Failed(err.to_string()),
        }
    }
}
