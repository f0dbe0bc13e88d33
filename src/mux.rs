//! Channel multiplexing over a single frame stream.
//!
//! One [`Multiplexer`] owns the per-channel state of a connection: the
//! synchronous call window of each channel, the pending caller waiting
//! on a reply, and the inbound queue for asynchronous traffic. The
//! multiplexer itself is synchronous bookkeeping; the connection core
//! drives it from one task, so no locking is needed across channels.
//!
//! Outbound, a method frame is validated against its channel's tracker,
//! encoded, and wrapped into an [`OutboundFrame`] for the writer task.
//! Inbound, each assembled envelope is decoded and routed: replies
//! complete the pending call via its oneshot, everything else flows to
//! the channel's inbound mpsc queue.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::channel::{CallTracker, Routing};
use crate::error::{Result, WireError};
use crate::framing::{Frame, FrameKind};
use crate::method::{MethodFrame, MethodRegistry};
use crate::writer::OutboundFrame;

/// A synchronous call waiting for its reply.
struct PendingCall {
    /// Guards the timeout/response race: a cancel only applies if its
    /// generation still matches.
    generation: u64,
    reply_tx: oneshot::Sender<Result<MethodFrame>>,
}

/// Everything the multiplexer tracks for one open channel.
struct ChannelState {
    tracker: CallTracker,
    pending: Option<PendingCall>,
    inbound_tx: mpsc::Sender<MethodFrame>,
}

impl ChannelState {
    fn new(channel: u16, inbound_tx: mpsc::Sender<MethodFrame>) -> Self {
        Self {
            tracker: CallTracker::new(channel),
            pending: None,
            inbound_tx,
        }
    }
}

/// Per-connection channel bookkeeping and frame routing.
///
/// Channel 0 always exists; it is reserved for connection-class methods
/// and cannot be closed. Other channels are opened and closed by the
/// caller.
pub struct Multiplexer {
    registry: &'static MethodRegistry,
    channels: HashMap<u16, ChannelState>,
    /// Capacity of each channel's inbound queue.
    inbound_capacity: usize,
    next_generation: u64,
}

impl Multiplexer {
    /// Create a multiplexer with channel 0 pre-opened.
    ///
    /// Returns the multiplexer and the inbound receiver for channel 0.
    pub fn new(
        registry: &'static MethodRegistry,
        inbound_capacity: usize,
    ) -> (Self, mpsc::Receiver<MethodFrame>) {
        let (tx, rx) = mpsc::channel(inbound_capacity);
        let mut channels = HashMap::new();
        channels.insert(0, ChannelState::new(0, tx));

        let mux = Self {
            registry,
            channels,
            inbound_capacity,
            next_generation: 0,
        };
        (mux, rx)
    }

    /// Whether `channel` currently has state.
    pub fn is_open(&self, channel: u16) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Open a channel, returning its inbound receiver.
    ///
    /// # Errors
    ///
    /// Channel 0 is reserved; opening an already-open channel is an
    /// error.
    pub fn open_channel(&mut self, channel: u16) -> Result<mpsc::Receiver<MethodFrame>> {
        if channel == 0 {
            return Err(WireError::Protocol(
                "channel 0 is reserved and always open".to_string(),
            ));
        }
        if self.channels.contains_key(&channel) {
            return Err(WireError::Protocol(format!(
                "channel {channel} is already open"
            )));
        }

        let (tx, rx) = mpsc::channel(self.inbound_capacity);
        self.channels.insert(channel, ChannelState::new(channel, tx));
        debug!(channel, "channel opened");
        Ok(rx)
    }

    /// Close a channel, failing its pending call with
    /// [`WireError::ChannelClosed`].
    pub fn close_channel(&mut self, channel: u16) -> Result<()> {
        if channel == 0 {
            return Err(WireError::Protocol("channel 0 cannot be closed".to_string()));
        }
        let mut state = self
            .channels
            .remove(&channel)
            .ok_or(WireError::UnknownChannel(channel))?;

        if let Some(pending) = state.pending.take() {
            let _ = pending.reply_tx.send(Err(WireError::ChannelClosed(channel)));
        }
        debug!(channel, "channel closed");
        Ok(())
    }

    /// Validate and encode an asynchronous method for the writer.
    ///
    /// # Errors
    ///
    /// Synchronous methods are rejected; they open a call window and
    /// must go through [`Multiplexer::begin_call`].
    pub fn prepare_send(&self, frame: &MethodFrame) -> Result<OutboundFrame> {
        let channel = frame.channel();
        if !self.channels.contains_key(&channel) {
            return Err(WireError::UnknownChannel(channel));
        }
        if frame.is_synchronous() {
            return Err(WireError::Protocol(format!(
                "{} expects a response and must be sent as a call",
                frame.name()
            )));
        }

        let payload = frame.to_bytes()?;
        OutboundFrame::new(FrameKind::Method, channel, payload)
    }

    /// Open the call window for a synchronous method.
    ///
    /// On success returns the call's generation id (for cancellation),
    /// the encoded frame for the writer, and the oneshot that resolves
    /// with the matching response or a structured error.
    ///
    /// # Errors
    ///
    /// [`WireError::CallInProgress`] if this channel already has an
    /// outstanding call; asynchronous methods are rejected.
    pub fn begin_call(
        &mut self,
        frame: &MethodFrame,
    ) -> Result<(u64, OutboundFrame, oneshot::Receiver<Result<MethodFrame>>)> {
        let channel = frame.channel();
        let Some(state) = self.channels.get_mut(&channel) else {
            return Err(WireError::UnknownChannel(channel));
        };
        if !frame.is_synchronous() {
            return Err(WireError::Protocol(format!(
                "{} has no response set; use send",
                frame.name()
            )));
        }

        state.tracker.on_send(frame.spec())?;

        // Roll the window back if encoding fails: the call never left.
        let encoded = frame
            .to_bytes()
            .and_then(|payload| OutboundFrame::new(FrameKind::Method, channel, payload));
        let outbound = match encoded {
            Ok(f) => f,
            Err(err) => {
                state.tracker.force_idle();
                return Err(err);
            }
        };

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let (reply_tx, reply_rx) = oneshot::channel();
        state.pending = Some(PendingCall {
            generation,
            reply_tx,
        });

        trace!(channel, method = frame.name(), generation, "call started");
        Ok((generation, outbound, reply_rx))
    }

    /// Abandon a pending call if it is still the one `generation` names.
    ///
    /// A stale cancel (the call already completed, possibly with a new
    /// one started) is a no-op. After a genuine cancel, the response
    /// arriving later is treated as unexpected and tears the channel
    /// down.
    pub fn cancel_call(&mut self, channel: u16, generation: u64) {
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        match &state.pending {
            Some(pending) if pending.generation == generation => {
                state.pending = None;
                state.tracker.force_idle();
                debug!(channel, generation, "call cancelled");
            }
            _ => {
                trace!(channel, generation, "ignoring stale cancel");
            }
        }
    }

    /// Route one assembled frame.
    ///
    /// Heartbeats are dropped with a trace log. Protocol violations on a
    /// non-zero channel tear that channel down and return `Ok`; an `Err`
    /// from this method is connection-fatal (unknown channel, content
    /// frames, channel-0 violations).
    pub fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        match frame.header.kind {
            FrameKind::Heartbeat => {
                trace!("heartbeat received");
                Ok(())
            }
            FrameKind::ContentHeader | FrameKind::ContentBody => Err(WireError::Protocol(format!(
                "content frame (type {}) on channel {}: content transfer is not supported",
                frame.header.kind.as_octet(),
                frame.header.channel
            ))),
            FrameKind::Method => self.handle_method(frame.header.channel, &frame.payload),
        }
    }

    fn handle_method(&mut self, channel: u16, payload: &[u8]) -> Result<()> {
        if !self.channels.contains_key(&channel) {
            return Err(WireError::UnknownChannel(channel));
        }

        let method = match MethodFrame::decode(self.registry, channel, payload) {
            Ok(m) => m,
            Err(err) => return self.channel_fatal(channel, err),
        };
        let is_reply = self.registry.is_reply(method.id());

        let Some(state) = self.channels.get_mut(&channel) else {
            return Err(WireError::UnknownChannel(channel));
        };

        match state.tracker.on_receive(method.spec(), is_reply) {
            Ok(Routing::Reply) => {
                if let Some(pending) = state.pending.take() {
                    trace!(channel, method = method.name(), "call completed");
                    // The caller may have dropped its receiver; the reply
                    // is simply discarded then.
                    let _ = pending.reply_tx.send(Ok(method));
                } else {
                    debug!(channel, method = method.name(), "reply with no pending caller");
                }
                Ok(())
            }
            Ok(Routing::Deliver) => {
                match state.inbound_tx.try_send(method) {
                    Ok(()) => Ok(()),
                    Err(mpsc::error::TrySendError::Full(dropped)) => {
                        warn!(
                            channel,
                            method = dropped.name(),
                            "inbound queue full, dropping frame"
                        );
                        Ok(())
                    }
                    Err(mpsc::error::TrySendError::Closed(dropped)) => {
                        debug!(
                            channel,
                            method = dropped.name(),
                            "inbound receiver gone, dropping frame"
                        );
                        Ok(())
                    }
                }
            }
            Err(err) => self.channel_fatal(channel, err),
        }
    }

    /// Fail every pending call with [`WireError::ConnectionClosed`] and
    /// drop all channel state. Called when the connection dies.
    pub fn fail_all(&mut self) {
        for (&channel, state) in self.channels.iter_mut() {
            if let Some(pending) = state.pending.take() {
                debug!(channel, "failing pending call: connection closed");
                let _ = pending.reply_tx.send(Err(WireError::ConnectionClosed));
            }
        }
        self.channels.clear();
    }

    /// Tear down after a protocol violation: channel 0 escalates to the
    /// connection, other channels are closed locally.
    fn channel_fatal(&mut self, channel: u16, err: WireError) -> Result<()> {
        if channel == 0 {
            self.fail_channel(0, duplicate(&err));
            return Err(err);
        }
        self.fail_channel(channel, err);
        Ok(())
    }

    fn fail_channel(&mut self, channel: u16, err: WireError) {
        warn!(channel, error = %err, "closing channel after protocol violation");
        if let Some(mut state) = self.channels.remove(&channel) {
            if let Some(pending) = state.pending.take() {
                let _ = pending.reply_tx.send(Err(err));
            }
        }
    }
}

/// Copy a routing error so one instance reaches the pending caller while
/// the original propagates. `Io` is the only variant without a faithful
/// copy; it degrades to `Protocol` text.
fn duplicate(err: &WireError) -> WireError {
    match err {
        WireError::UnknownMethod {
            class_id,
            method_id,
        } => WireError::UnknownMethod {
            class_id: *class_id,
            method_id: *method_id,
        },
        WireError::UnexpectedResponse {
            class_id,
            method_id,
        } => WireError::UnexpectedResponse {
            class_id: *class_id,
            method_id: *method_id,
        },
        WireError::UnknownChannel(ch) => WireError::UnknownChannel(*ch),
        WireError::ChannelClosed(ch) => WireError::ChannelClosed(*ch),
        WireError::Protocol(msg) => WireError::Protocol(msg.clone()),
        other => WireError::Protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::FrameHeader;
    use crate::method::defs::{basic, channel as channel_class, queue};
    use crate::wire::FieldValue;
    use bytes::Bytes;
    use tokio::sync::oneshot::error::TryRecvError;

    fn mux() -> (Multiplexer, mpsc::Receiver<MethodFrame>) {
        Multiplexer::new(MethodRegistry::amqp091(), 8)
    }

    /// Wrap an encoded method frame in its wire envelope, as the
    /// assembler would produce it.
    fn inbound(frame: &MethodFrame) -> Frame {
        let payload = frame.to_bytes().unwrap();
        let header = FrameHeader::new(FrameKind::Method, frame.channel(), payload.len() as u32);
        Frame::new(header, payload)
    }

    fn flow(ch: u16, active: bool) -> MethodFrame {
        MethodFrame::new(&channel_class::FLOW, ch, vec![FieldValue::Bit(active)]).unwrap()
    }

    fn flow_ok(ch: u16, active: bool) -> MethodFrame {
        MethodFrame::new(&channel_class::FLOW_OK, ch, vec![FieldValue::Bit(active)]).unwrap()
    }

    fn publish(ch: u16) -> MethodFrame {
        MethodFrame::new(
            &basic::PUBLISH,
            ch,
            vec![
                FieldValue::Short(0),
                FieldValue::ShortStr(String::new()),
                FieldValue::ShortStr("key".to_string()),
                FieldValue::Bit(false),
                FieldValue::Bit(false),
            ],
        )
        .unwrap()
    }

    fn deliver(ch: u16, tag: u64) -> MethodFrame {
        MethodFrame::new(
            &basic::DELIVER,
            ch,
            vec![
                FieldValue::ShortStr("ctag-1".to_string()),
                FieldValue::LongLong(tag),
                FieldValue::Bit(false),
                FieldValue::ShortStr("logs".to_string()),
                FieldValue::ShortStr("info".to_string()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_channel_zero_always_open() {
        let (mux, _rx0) = mux();
        assert!(mux.is_open(0));
        mux.prepare_send(&publish(0)).unwrap();
    }

    #[test]
    fn test_open_and_close_channel() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();
        assert!(mux.is_open(1));

        mux.close_channel(1).unwrap();
        assert!(!mux.is_open(1));
        assert!(matches!(
            mux.prepare_send(&publish(1)),
            Err(WireError::UnknownChannel(1))
        ));
    }

    #[test]
    fn test_channel_zero_is_protected() {
        let (mut mux, _rx0) = mux();
        assert!(mux.open_channel(0).is_err());
        assert!(mux.close_channel(0).is_err());
    }

    #[test]
    fn test_duplicate_open_rejected() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();
        assert!(mux.open_channel(1).is_err());
    }

    #[test]
    fn test_close_unknown_channel_rejected() {
        let (mut mux, _rx0) = mux();
        assert!(matches!(
            mux.close_channel(5),
            Err(WireError::UnknownChannel(5))
        ));
    }

    #[test]
    fn test_prepare_send_rejects_synchronous() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let err = mux.prepare_send(&flow(1, true)).unwrap_err();
        assert!(matches!(err, WireError::Protocol(_)));
    }

    #[test]
    fn test_begin_call_rejects_asynchronous() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let err = mux.begin_call(&publish(1)).unwrap_err();
        assert!(matches!(err, WireError::Protocol(_)));
    }

    #[test]
    fn test_call_completes_on_matching_reply() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let (_gen, outbound, mut reply_rx) = mux.begin_call(&flow(1, true)).unwrap();
        assert_eq!(outbound.payload.len(), 5); // 4-byte method header + 1 bit octet
        assert!(matches!(reply_rx.try_recv(), Err(TryRecvError::Empty)));

        mux.handle_frame(inbound(&flow_ok(1, true))).unwrap();

        let reply = reply_rx.try_recv().unwrap().unwrap();
        assert_eq!(reply.id(), (20, 21));
        assert_eq!(reply.value("active").unwrap().as_bit(), Some(true));
        assert!(mux.is_open(1));
    }

    #[test]
    fn test_second_call_rejected_while_pending() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let (_gen, _outbound, _reply_rx) = mux.begin_call(&flow(1, true)).unwrap();
        let err = mux.begin_call(&flow(1, false)).unwrap_err();
        assert!(matches!(err, WireError::CallInProgress(1)));
    }

    #[test]
    fn test_deliver_routes_to_inbound_queue() {
        let (mut mux, _rx0) = mux();
        let mut rx = mux.open_channel(1).unwrap();

        mux.handle_frame(inbound(&deliver(1, 42))).unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.name(), "Basic.Deliver");
        assert_eq!(frame.value("delivery_tag").unwrap().as_long_long(), Some(42));
    }

    #[test]
    fn test_deliver_while_call_pending() {
        let (mut mux, _rx0) = mux();
        let mut rx = mux.open_channel(1).unwrap();

        let (_gen, _outbound, mut reply_rx) = mux.begin_call(&flow(1, true)).unwrap();
        mux.handle_frame(inbound(&deliver(1, 7))).unwrap();

        // Delivery flows through; the call stays pending
        assert!(rx.try_recv().is_ok());
        assert!(matches!(reply_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_full_inbound_queue_drops_frame() {
        let (mut mux, _rx0) = Multiplexer::new(MethodRegistry::amqp091(), 1);
        let mut rx = mux.open_channel(1).unwrap();

        mux.handle_frame(inbound(&deliver(1, 1))).unwrap();
        mux.handle_frame(inbound(&deliver(1, 2))).unwrap(); // dropped, queue full

        let first = rx.try_recv().unwrap();
        assert_eq!(first.value("delivery_tag").unwrap().as_long_long(), Some(1));
        assert!(rx.try_recv().is_err());
        // The channel survives an overload drop
        assert!(mux.is_open(1));
    }

    #[test]
    fn test_unexpected_response_tears_channel_down() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let (_gen, _outbound, mut reply_rx) = mux.begin_call(&flow(1, true)).unwrap();

        // A reply-classified method that is not in Flow's response set
        let bogus = MethodFrame::new(
            &queue::DECLARE_OK,
            1,
            vec![
                FieldValue::ShortStr("q".to_string()),
                FieldValue::Long(0),
                FieldValue::Long(0),
            ],
        )
        .unwrap();

        // Channel-local failure: handle_frame itself succeeds
        mux.handle_frame(inbound(&bogus)).unwrap();

        let err = reply_rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, WireError::UnexpectedResponse { .. }));
        assert!(!mux.is_open(1));
    }

    #[test]
    fn test_unknown_channel_is_connection_fatal() {
        let (mut mux, _rx0) = mux();
        let err = mux.handle_frame(inbound(&deliver(9, 1))).unwrap_err();
        assert!(matches!(err, WireError::UnknownChannel(9)));
    }

    #[test]
    fn test_unknown_method_tears_channel_down() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let header = FrameHeader::new(FrameKind::Method, 1, 4);
        let frame = Frame::new(header, Bytes::from_static(&[0x03, 0xE7, 0x03, 0xE7]));

        mux.handle_frame(frame).unwrap();
        assert!(!mux.is_open(1));
    }

    #[test]
    fn test_channel_zero_violation_is_connection_fatal() {
        let (mut mux, _rx0) = mux();

        let header = FrameHeader::new(FrameKind::Method, 0, 4);
        let frame = Frame::new(header, Bytes::from_static(&[0x03, 0xE7, 0x03, 0xE7]));

        let err = mux.handle_frame(frame).unwrap_err();
        assert!(matches!(err, WireError::UnknownMethod { .. }));
    }

    #[test]
    fn test_heartbeat_dropped_silently() {
        let (mut mux, _rx0) = mux();
        let frame = Frame::new(FrameHeader::new(FrameKind::Heartbeat, 0, 0), Bytes::new());
        mux.handle_frame(frame).unwrap();
    }

    #[test]
    fn test_content_frames_rejected() {
        let (mut mux, _rx0) = mux();
        let frame = Frame::new(FrameHeader::new(FrameKind::ContentHeader, 1, 0), Bytes::new());
        let err = mux.handle_frame(frame).unwrap_err();
        assert!(matches!(err, WireError::Protocol(_)));
    }

    #[test]
    fn test_cancel_frees_call_window() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let (generation, _outbound, _reply_rx) = mux.begin_call(&flow(1, true)).unwrap();
        mux.cancel_call(1, generation);

        // New call goes through
        let (_gen2, _outbound2, _reply_rx2) = mux.begin_call(&flow(1, false)).unwrap();
    }

    #[test]
    fn test_response_after_cancel_tears_channel_down() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let (generation, _outbound, _reply_rx) = mux.begin_call(&flow(1, true)).unwrap();
        mux.cancel_call(1, generation);

        // The abandoned response is stale reply traffic now
        mux.handle_frame(inbound(&flow_ok(1, true))).unwrap();
        assert!(!mux.is_open(1));
    }

    #[test]
    fn test_stale_cancel_does_not_touch_new_call() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let (gen1, _outbound1, mut reply_rx1) = mux.begin_call(&flow(1, true)).unwrap();
        mux.handle_frame(inbound(&flow_ok(1, true))).unwrap();
        reply_rx1.try_recv().unwrap().unwrap();

        let (_gen2, _outbound2, mut reply_rx2) = mux.begin_call(&flow(1, false)).unwrap();
        mux.cancel_call(1, gen1); // stale: must not clobber the second call

        mux.handle_frame(inbound(&flow_ok(1, false))).unwrap();
        let reply = reply_rx2.try_recv().unwrap().unwrap();
        assert_eq!(reply.value("active").unwrap().as_bit(), Some(false));
    }

    #[test]
    fn test_close_channel_fails_pending_call() {
        let (mut mux, _rx0) = mux();
        let _rx = mux.open_channel(1).unwrap();

        let (_gen, _outbound, mut reply_rx) = mux.begin_call(&flow(1, true)).unwrap();
        mux.close_channel(1).unwrap();

        let err = reply_rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, WireError::ChannelClosed(1)));
    }

    #[test]
    fn test_fail_all_notifies_every_pending_call() {
        let (mut mux, _rx0) = mux();
        let _rx1 = mux.open_channel(1).unwrap();
        let _rx2 = mux.open_channel(2).unwrap();

        let (_g1, _o1, mut reply_rx1) = mux.begin_call(&flow(1, true)).unwrap();
        let (_g2, _o2, mut reply_rx2) = mux.begin_call(&flow(2, true)).unwrap();

        mux.fail_all();

        assert!(matches!(
            reply_rx1.try_recv().unwrap().unwrap_err(),
            WireError::ConnectionClosed
        ));
        assert!(matches!(
            reply_rx2.try_recv().unwrap().unwrap_err(),
            WireError::ConnectionClosed
        ));
        assert!(!mux.is_open(1));
        assert!(!mux.is_open(2));
    }
}
