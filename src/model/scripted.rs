//! A model that replays prepared event scripts, one per step.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::{EventStream, ModelClient, ModelRequest};
use crate::error::WeftError;
use crate::types::StreamEvent;

/// Events of one model round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptStep {
    pub events: Vec<StreamEvent>,
    /// Keep the stream open after the last event instead of ending it.
    #[serde(default)]
    pub hang: bool,
    /// Fail the request instead of streaming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
}

impl ScriptStep {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// Stream the events, then stay open until cancelled.
    pub fn hanging(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            hang: true,
            fail: None,
        }
    }

    /// Reject the request with a model error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            hang: false,
            fail: Some(message.into()),
        }
    }
}

/// Replays [`ScriptStep`]s in order and records the requests it received.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedModel {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue another step.
    pub fn push_step(&self, step: ScriptStep) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ModelRequest) -> Result<EventStream, WeftError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let step = self
            .steps
            .lock()
            .map_err(|_| WeftError::InvalidState("script lock poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| WeftError::Model("script exhausted".to_string()))?;
        if let Some(message) = step.fail {
            return Err(WeftError::Model(message));
        }

        let events = stream::iter(step.events.into_iter().map(Ok));
        if step.hang {
            let cancel = request.cancel.clone();
            let tail = stream::once(async move {
                cancel.cancelled().await;
                Err(WeftError::Cancelled)
            });
            Ok(events.chain(tail).boxed())
        } else {
            Ok(events.boxed())
        }
    }
}
