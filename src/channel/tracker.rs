//! Per-channel synchronous call tracking.
//!
//! Each channel allows at most one outstanding synchronous method at a
//! time. [`CallTracker`] enforces that rule and classifies every inbound
//! method into reply traffic (completes the outstanding call) or
//! asynchronous delivery (forwarded to the channel's consumer).

use crate::error::{Result, WireError};
use crate::method::{MethodId, MethodSpec};

/// Where an inbound method should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Asynchronous traffic. Forward to the channel's inbound stream.
    Deliver,
    /// Completes the outstanding synchronous call on this channel.
    Reply,
}

/// Call state of one channel.
#[derive(Debug, Clone, Copy)]
enum CallState {
    /// No synchronous call outstanding.
    Idle,
    /// A synchronous method was sent; one of `expected` must come back
    /// before another synchronous call may start.
    AwaitingResponse { expected: &'static [MethodId] },
}

/// Tracks the synchronous call window of a single channel.
///
/// The tracker is pure bookkeeping: it decides what is legal and where
/// traffic routes, while the multiplexer owns the actual reply wakeups.
#[derive(Debug)]
pub struct CallTracker {
    channel: u16,
    state: CallState,
}

impl CallTracker {
    /// Create a tracker for `channel`, starting idle.
    pub fn new(channel: u16) -> Self {
        Self {
            channel,
            state: CallState::Idle,
        }
    }

    /// The channel this tracker belongs to.
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Whether a synchronous call is currently outstanding.
    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, CallState::AwaitingResponse { .. })
    }

    /// Record an outbound method.
    ///
    /// Asynchronous methods pass through without touching state. A
    /// synchronous method opens the call window; if one is already open
    /// this fails with [`WireError::CallInProgress`] and the existing
    /// call is unaffected.
    pub fn on_send(&mut self, spec: &'static MethodSpec) -> Result<()> {
        if !spec.is_synchronous() {
            return Ok(());
        }
        if self.is_awaiting() {
            return Err(WireError::CallInProgress(self.channel));
        }
        self.state = CallState::AwaitingResponse {
            expected: spec.responses,
        };
        Ok(())
    }

    /// Classify an inbound method.
    ///
    /// `is_reply` is the registry's verdict on whether this method id
    /// appears in any method's response set. Non-reply traffic is
    /// delivered in any state. Reply traffic must match the outstanding
    /// call; a reply that matches closes the window.
    ///
    /// # Errors
    ///
    /// [`WireError::UnexpectedResponse`] if reply traffic arrives while
    /// idle, or does not match the expected response set. State is left
    /// untouched so the caller can tear the channel down deliberately.
    pub fn on_receive(&mut self, spec: &'static MethodSpec, is_reply: bool) -> Result<Routing> {
        if !is_reply {
            return Ok(Routing::Deliver);
        }

        match self.state {
            CallState::AwaitingResponse { expected } if expected.contains(&spec.id()) => {
                self.state = CallState::Idle;
                Ok(Routing::Reply)
            }
            _ => Err(WireError::UnexpectedResponse {
                class_id: spec.class_id,
                method_id: spec.method_id,
            }),
        }
    }

    /// Abandon the outstanding call, if any.
    ///
    /// Used when a caller cancels (timeout) or the channel is torn down.
    /// Returns whether a call was actually outstanding.
    pub fn force_idle(&mut self) -> bool {
        let was_awaiting = self.is_awaiting();
        self.state = CallState::Idle;
        was_awaiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::defs::{basic, channel, queue};

    #[test]
    fn test_async_send_keeps_idle() {
        let mut tracker = CallTracker::new(1);
        tracker.on_send(&basic::PUBLISH).unwrap();
        assert!(!tracker.is_awaiting());
    }

    #[test]
    fn test_sync_send_opens_window() {
        let mut tracker = CallTracker::new(1);
        tracker.on_send(&channel::FLOW).unwrap();
        assert!(tracker.is_awaiting());
    }

    #[test]
    fn test_second_sync_call_rejected() {
        let mut tracker = CallTracker::new(3);
        tracker.on_send(&channel::FLOW).unwrap();

        let err = tracker.on_send(&queue::DECLARE).unwrap_err();
        assert!(matches!(err, WireError::CallInProgress(3)));
        // The original call is still outstanding
        assert!(tracker.is_awaiting());
    }

    #[test]
    fn test_async_send_allowed_while_awaiting() {
        let mut tracker = CallTracker::new(1);
        tracker.on_send(&channel::FLOW).unwrap();
        tracker.on_send(&basic::PUBLISH).unwrap();
        assert!(tracker.is_awaiting());
    }

    #[test]
    fn test_matching_reply_closes_window() {
        let mut tracker = CallTracker::new(1);
        tracker.on_send(&channel::FLOW).unwrap();

        let routing = tracker.on_receive(&channel::FLOW_OK, true).unwrap();
        assert_eq!(routing, Routing::Reply);
        assert!(!tracker.is_awaiting());
    }

    #[test]
    fn test_get_accepts_either_response() {
        let mut tracker = CallTracker::new(1);
        tracker.on_send(&basic::GET).unwrap();
        assert_eq!(
            tracker.on_receive(&basic::GET_OK, true).unwrap(),
            Routing::Reply
        );

        tracker.on_send(&basic::GET).unwrap();
        assert_eq!(
            tracker.on_receive(&basic::GET_EMPTY, true).unwrap(),
            Routing::Reply
        );
    }

    #[test]
    fn test_async_inbound_delivers_while_awaiting() {
        let mut tracker = CallTracker::new(1);
        tracker.on_send(&basic::GET).unwrap();

        let routing = tracker.on_receive(&basic::DELIVER, false).unwrap();
        assert_eq!(routing, Routing::Deliver);
        // Still waiting for GetOk / GetEmpty
        assert!(tracker.is_awaiting());
    }

    #[test]
    fn test_wrong_reply_leaves_state_untouched() {
        let mut tracker = CallTracker::new(1);
        tracker.on_send(&channel::FLOW).unwrap();

        let err = tracker.on_receive(&queue::DECLARE_OK, true).unwrap_err();
        assert!(matches!(
            err,
            WireError::UnexpectedResponse {
                class_id: 50,
                method_id: 11
            }
        ));
        assert!(tracker.is_awaiting());

        // The matching reply still completes after the bogus one
        assert_eq!(
            tracker.on_receive(&channel::FLOW_OK, true).unwrap(),
            Routing::Reply
        );
    }

    #[test]
    fn test_reply_while_idle_rejected() {
        let mut tracker = CallTracker::new(1);
        let err = tracker.on_receive(&channel::FLOW_OK, true).unwrap_err();
        assert!(matches!(err, WireError::UnexpectedResponse { .. }));
    }

    #[test]
    fn test_force_idle_reports_outstanding_call() {
        let mut tracker = CallTracker::new(1);
        assert!(!tracker.force_idle());

        tracker.on_send(&channel::FLOW).unwrap();
        assert!(tracker.force_idle());
        assert!(!tracker.is_awaiting());

        // Window is free again
        tracker.on_send(&channel::FLOW).unwrap();
    }
}
