//! Settled result of one request.

use crate::repair::RepairReport;
use crate::types::{FinishReason, Message};

/// How a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestStatus {
    Completed(FinishReason),
    /// Stream-terminal error; the last message carries it.
    Failed(String),
    /// Stopped by the user. Not an error.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub session_id: String,
    pub request_id: String,
    /// Authoritative history to hand to the store.
    pub messages: Vec<Message>,
    pub status: RequestStatus,
    /// Everything repair dropped while preparing submissions.
    pub repair: RepairReport,
    /// Model round trips made.
    pub steps: usize,
}

impl RequestOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RequestStatus::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, RequestStatus::Cancelled)
    }

    /// The failure message, if the request failed.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            RequestStatus::Failed(message) => Some(message),
            _ => None,
        }
    }
}
