//! Callbacks for following a request as it runs.

use crate::projection::{ClientProjection, WireEnvelope};
use crate::types::Message;

/// Receives every snapshot and transport message of a request, in order.
///
/// Both methods run on the request's task between events; they should return
/// quickly.
pub trait Observer: Send {
    /// The conversation after a state-changing event.
    fn on_snapshot(&mut self, _messages: &[Message]) {}

    /// The transport encoding of that event, or a lifecycle message.
    fn on_wire(&mut self, _envelope: WireEnvelope) {}
}

impl Observer for () {}

/// Forwards transport messages to an in-process projection.
impl Observer for ClientProjection {
    fn on_wire(&mut self, envelope: WireEnvelope) {
        self.apply_envelope(envelope);
    }
}

/// Keeps everything it observes.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub snapshots: Vec<Vec<Message>>,
    pub wire: Vec<WireEnvelope>,
}

impl Observer for RecordingObserver {
    fn on_snapshot(&mut self, messages: &[Message]) {
        self.snapshots.push(messages.to_vec());
    }

    fn on_wire(&mut self, envelope: WireEnvelope) {
        self.wire.push(envelope);
    }
}
