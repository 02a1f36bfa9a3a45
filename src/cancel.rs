//! Per-request cancellation and the single in-flight request slot.
//!
//! Each request gets one [`CancellationToken`]. The stream loop checks it
//! before every event and every tool execution receives a clone, so tripping
//! it stops both model consumption and cooperative tools. A session admits at
//! most one request at a time: [`RequestSlot::acquire`] fails with
//! [`WeftError::Busy`] while a [`SlotGuard`] is alive.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, WeftError};

#[derive(Debug)]
struct ActiveRequest {
    request_id: Uuid,
    token: CancellationToken,
}

/// Single in-flight slot for one conversation session.
#[derive(Debug, Clone)]
pub struct RequestSlot {
    session_id: String,
    active: Arc<Mutex<Option<ActiveRequest>>>,
}

impl RequestSlot {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Claim the slot for a new request.
    pub fn acquire(&self) -> Result<SlotGuard> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| WeftError::InvalidState("request slot lock poisoned".to_string()))?;
        if active.is_some() {
            return Err(WeftError::Busy(self.session_id.clone()));
        }
        let request_id = Uuid::new_v4();
        let token = CancellationToken::new();
        *active = Some(ActiveRequest {
            request_id,
            token: token.clone(),
        });
        Ok(SlotGuard {
            request_id,
            token,
            active: self.active.clone(),
        })
    }

    /// Cancel the in-flight request, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let Ok(active) = self.active.lock() else {
            return false;
        };
        match active.as_ref() {
            Some(request) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    request_id = %request.request_id,
                    "cancelling in-flight request"
                );
                request.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Id of the in-flight request, if any.
    pub fn active_request(&self) -> Option<Uuid> {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.as_ref().map(|request| request.request_id))
    }

    pub fn is_busy(&self) -> bool {
        self.active_request().is_some()
    }
}

/// Ownership of the slot for the duration of one request.
///
/// Dropping the guard frees the slot.
#[derive(Debug)]
pub struct SlotGuard {
    request_id: Uuid,
    token: CancellationToken,
    active: Arc<Mutex<Option<ActiveRequest>>>,
}

impl SlotGuard {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The request's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            if active
                .as_ref()
                .is_some_and(|request| request.request_id == self.request_id)
            {
                *active = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_request_in_flight() {
        let slot = RequestSlot::new("s1");
        let guard = slot.acquire().unwrap();
        assert!(slot.is_busy());
        assert!(matches!(slot.acquire(), Err(WeftError::Busy(id)) if id == "s1"));
        drop(guard);
        assert!(!slot.is_busy());
        assert!(slot.acquire().is_ok());
    }

    #[test]
    fn cancel_trips_the_active_token() {
        let slot = RequestSlot::new("s1");
        assert!(!slot.cancel());
        let guard = slot.acquire().unwrap();
        let child = guard.token().child_token();
        assert!(slot.cancel());
        assert!(guard.token().is_cancelled());
        assert!(child.is_cancelled());
        assert_eq!(slot.active_request(), Some(guard.request_id()));
    }
}
