//! Model collaborator interface.

pub mod scripted;

pub use crate::tools::ToolSchema;
pub use scripted::{ScriptStep, ScriptedModel};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::WeftError;
use crate::types::{Message, StreamEvent};

/// Ordered stream of generation events.
pub type EventStream = BoxStream<'static, Result<StreamEvent, WeftError>>;

/// One model round trip.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: Option<String>,
    /// Repaired history to submit.
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub cancel: CancellationToken,
}

/// A language model handle, already bound to its provider and credentials.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Start streaming a response.
    ///
    /// Implementations emit events in causal order and should stop producing
    /// once `request.cancel` is tripped.
    async fn stream(&self, request: ModelRequest) -> Result<EventStream, WeftError>;
}
