//! Convenience re-exports for common use.

pub use crate::config::WeftConfig;
pub use crate::error::{Result, WeftError};
pub use crate::model::{ModelClient, ModelRequest};
pub use crate::orchestrator::{Observer, Orchestrator, RequestOutcome, RequestStatus};
pub use crate::projection::{ClientProjection, WireEnvelope, WireMessage};
pub use crate::reducer::{reduce, ReduceOutcome, ReduceStatus};
pub use crate::repair::{repair, repair_with_report, RepairReport};
pub use crate::store::{HistoryStore, JsonFileStore, MemoryStore};
pub use crate::tools::{ClosureTool, Tool, ToolSet};
pub use crate::types::{
    Content, FinishReason, Message, Metadata, Part, Role, StreamEvent, ToolCallPart, ToolOutput,
    ToolResultPart,
};
