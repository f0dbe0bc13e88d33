//! Connection lifecycle and per-channel handles.
//!
//! [`Connection::start`] takes the two halves of a byte transport and
//! spawns the runtime: a writer task owning the write half (see
//! [`crate::writer`]) and a core task owning the read half, the frame
//! assembler, and the [`Multiplexer`]. Callers never touch those
//! directly; each open channel is driven through a [`ChannelHandle`],
//! which talks to the core task over a command queue and to the writer
//! task through its own [`WriterHandle`].
//!
//! # Example
//!
//! ```ignore
//! use methodwire::method::defs::channel;
//! use methodwire::{Connection, ConnectionConfig, FieldValue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = connect_somehow().await?;
//!     let (reader, writer) = tokio::io::split(stream);
//!     let (conn, _control) = Connection::start(reader, writer, ConnectionConfig::default());
//!
//!     let ch = conn.open_channel(1).await?;
//!     let reply = ch.call(&channel::FLOW, vec![FieldValue::Bit(true)]).await?;
//!     println!("flow now: {:?}", reply.value("active"));
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, WireError};
use crate::framing::{FrameAssembler, DEFAULT_MAX_FRAME_SIZE};
use crate::method::{MethodFrame, MethodRegistry, MethodSpec};
use crate::mux::Multiplexer;
use crate::wire::FieldValue;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default capacity of each channel's inbound queue.
pub const DEFAULT_INBOUND_CAPACITY: usize = 64;

/// Capacity of the command queue into the core task.
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum accepted inbound frame payload size.
    pub max_frame_size: u32,
    /// Capacity of each channel's inbound queue; overflow drops frames.
    pub inbound_capacity: usize,
    /// Writer task limits.
    pub writer: WriterConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            writer: WriterConfig::default(),
        }
    }
}

/// A started synchronous call, handed back to the calling task.
struct CallTicket {
    generation: u64,
    outbound: OutboundFrame,
    reply_rx: oneshot::Receiver<Result<MethodFrame>>,
}

/// Requests served by the core task.
enum Command {
    OpenChannel {
        channel: u16,
        reply: oneshot::Sender<Result<mpsc::Receiver<MethodFrame>>>,
    },
    CloseChannel {
        channel: u16,
        reply: oneshot::Sender<Result<()>>,
    },
    Call {
        frame: MethodFrame,
        reply: oneshot::Sender<Result<CallTicket>>,
    },
    Send {
        frame: MethodFrame,
        reply: oneshot::Sender<Result<OutboundFrame>>,
    },
    CancelCall {
        channel: u16,
        generation: u64,
    },
}

/// Caller-side handle to one open channel.
///
/// Synchronous methods go through [`call`](Self::call) or
/// [`call_timeout`](Self::call_timeout), asynchronous ones through
/// [`send`](Self::send); [`recv`](Self::recv) yields the channel's
/// delivered inbound methods. The handle is not cloneable: it owns the
/// channel's inbound queue.
pub struct ChannelHandle {
    channel: u16,
    commands: mpsc::Sender<Command>,
    writer: WriterHandle,
    inbound: mpsc::Receiver<MethodFrame>,
}

impl ChannelHandle {
    /// The channel number this handle drives.
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Send a synchronous method and wait for its matching response.
    ///
    /// At most one call may be outstanding per channel; a second one is
    /// rejected with [`WireError::CallInProgress`].
    pub async fn call(
        &self,
        spec: &'static MethodSpec,
        values: Vec<FieldValue>,
    ) -> Result<MethodFrame> {
        let (_generation, reply_rx) = self.start_call(spec, values).await?;
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(WireError::ConnectionClosed),
        }
    }

    /// Like [`call`](Self::call), but gives up after `timeout`.
    ///
    /// On expiry the pending call is cancelled so the channel's call
    /// window frees up; the response arriving later is then treated as
    /// unexpected and closes the channel.
    pub async fn call_timeout(
        &self,
        spec: &'static MethodSpec,
        values: Vec<FieldValue>,
        timeout: Duration,
    ) -> Result<MethodFrame> {
        let (generation, reply_rx) = self.start_call(spec, values).await?;
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WireError::ConnectionClosed),
            Err(_) => {
                self.cancel(generation);
                Err(WireError::Timeout)
            }
        }
    }

    /// Send an asynchronous method (fire-and-forget).
    ///
    /// Synchronous methods are rejected; they must go through
    /// [`call`](Self::call) so their response has a waiter.
    pub async fn send(&self, spec: &'static MethodSpec, values: Vec<FieldValue>) -> Result<()> {
        let frame = MethodFrame::new(spec, self.channel, values)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WireError::ConnectionClosed)?;
        let outbound = reply_rx.await.map_err(|_| WireError::ConnectionClosed)??;

        self.writer.send(outbound).await
    }

    /// Receive the next delivered inbound method on this channel.
    ///
    /// Returns `None` once the channel is closed or the connection is
    /// gone.
    pub async fn recv(&mut self) -> Option<MethodFrame> {
        self.inbound.recv().await
    }

    /// Close this channel, failing its pending call with
    /// [`WireError::ChannelClosed`].
    pub async fn close(self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::CloseChannel {
                channel: self.channel,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WireError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| WireError::ConnectionClosed)?
    }

    /// Register the call with the core task and put its frame on the
    /// wire. The window is rolled back if the write path is gone.
    async fn start_call(
        &self,
        spec: &'static MethodSpec,
        values: Vec<FieldValue>,
    ) -> Result<(u64, oneshot::Receiver<Result<MethodFrame>>)> {
        let frame = MethodFrame::new(spec, self.channel, values)?;

        let (command_tx, command_rx) = oneshot::channel();
        self.commands
            .send(Command::Call {
                frame,
                reply: command_tx,
            })
            .await
            .map_err(|_| WireError::ConnectionClosed)?;
        let CallTicket {
            generation,
            outbound,
            reply_rx,
        } = command_rx.await.map_err(|_| WireError::ConnectionClosed)??;

        if let Err(err) = self.writer.send(outbound).await {
            self.cancel(generation);
            return Err(err);
        }
        Ok((generation, reply_rx))
    }

    /// Best-effort cancel; if the core task is gone there is nothing
    /// left to cancel.
    fn cancel(&self, generation: u64) {
        let _ = self.commands.try_send(Command::CancelCall {
            channel: self.channel,
            generation,
        });
    }
}

/// A running connection.
///
/// Dropping the `Connection` and every [`ChannelHandle`] shuts the
/// runtime down; [`wait_for_shutdown`](Self::wait_for_shutdown) blocks
/// until the transport closes.
pub struct Connection {
    commands: mpsc::Sender<Command>,
    writer: WriterHandle,
    shutdown_rx: oneshot::Receiver<()>,
    _core_task: JoinHandle<Result<()>>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Connection {
    /// Start a connection over a split transport.
    ///
    /// Returns the connection and the handle for channel 0, which always
    /// exists and carries connection-class methods.
    pub fn start<R, W>(reader: R, writer: W, config: ConnectionConfig) -> (Self, ChannelHandle)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_handle, writer_task) = spawn_writer_task(writer, config.writer.clone());
        let (mux, inbound_zero) =
            Multiplexer::new(MethodRegistry::amqp091(), config.inbound_capacity);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let max_frame_size = config.max_frame_size;
        let core_task = tokio::spawn(async move {
            let result = core_loop(reader, mux, command_rx, max_frame_size).await;
            if let Err(e) = &result {
                tracing::error!("connection loop error: {e}");
            }
            let _ = shutdown_tx.send(());
            result
        });

        let control = ChannelHandle {
            channel: 0,
            commands: command_tx.clone(),
            writer: writer_handle.clone(),
            inbound: inbound_zero,
        };

        let connection = Connection {
            commands: command_tx,
            writer: writer_handle,
            shutdown_rx,
            _core_task: core_task,
            _writer_task: writer_task,
        };
        (connection, control)
    }

    /// Open a channel.
    ///
    /// # Errors
    ///
    /// Channel 0 is reserved, duplicate opens are rejected.
    pub async fn open_channel(&self, channel: u16) -> Result<ChannelHandle> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::OpenChannel {
                channel,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WireError::ConnectionClosed)?;
        let inbound = reply_rx.await.map_err(|_| WireError::ConnectionClosed)??;

        Ok(ChannelHandle {
            channel,
            commands: self.commands.clone(),
            writer: self.writer.clone(),
            inbound,
        })
    }

    /// Close a channel by number (see also [`ChannelHandle::close`]).
    pub async fn close_channel(&self, channel: u16) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::CloseChannel {
                channel,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WireError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| WireError::ConnectionClosed)?
    }

    /// Get the current backpressure status of the writer.
    pub fn is_backpressure_active(&self) -> bool {
        self.writer.is_backpressure_active()
    }

    /// Get the current pending outbound frame count.
    pub fn pending_frames(&self) -> usize {
        self.writer.pending_count()
    }

    /// Wait for shutdown (transport close or fatal protocol error).
    ///
    /// This consumes the connection and blocks until the core loop
    /// exits.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let _ = self.shutdown_rx.await;
        Ok(())
    }
}

/// Core task: reads bytes into the assembler, routes frames through the
/// multiplexer, and serves caller commands. Every exit path fails the
/// pending calls before returning.
async fn core_loop<R>(
    mut reader: R,
    mut mux: Multiplexer,
    mut commands: mpsc::Receiver<Command>,
    max_frame_size: u32,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut assembler = FrameAssembler::with_max_frame_size(max_frame_size);
    let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer

    let result = loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                match read {
                    Ok(0) => break Ok(()), // Transport closed
                    Ok(n) => {
                        let frames = match assembler.push(&buf[..n]) {
                            Ok(frames) => frames,
                            Err(e) => break Err(e),
                        };
                        let mut fatal = None;
                        for frame in frames {
                            if let Err(e) = mux.handle_frame(frame) {
                                fatal = Some(e);
                                break;
                            }
                        }
                        if let Some(e) = fatal {
                            break Err(e);
                        }
                    }
                    Err(e) => break Err(WireError::Io(e)),
                }
            }
            command = commands.recv() => {
                match command {
                    Some(command) => serve_command(&mut mux, command),
                    None => break Ok(()), // All handles dropped
                }
            }
        }
    };

    mux.fail_all();
    result
}

fn serve_command(mux: &mut Multiplexer, command: Command) {
    match command {
        Command::OpenChannel { channel, reply } => {
            let _ = reply.send(mux.open_channel(channel));
        }
        Command::CloseChannel { channel, reply } => {
            let _ = reply.send(mux.close_channel(channel));
        }
        Command::Call { frame, reply } => {
            let channel = frame.channel();
            let result = mux
                .begin_call(&frame)
                .map(|(generation, outbound, reply_rx)| CallTicket {
                    generation,
                    outbound,
                    reply_rx,
                });
            // If the caller vanished between command and reply, the call
            // window it opened must not leak.
            if let Err(Ok(ticket)) = reply.send(result) {
                mux.cancel_call(channel, ticket.generation);
            }
        }
        Command::Send { frame, reply } => {
            let _ = reply.send(mux.prepare_send(&frame));
        }
        Command::CancelCall {
            channel,
            generation,
        } => mux.cancel_call(channel, generation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::defs::basic;
    use crate::writer::DEFAULT_MAX_PENDING_FRAMES;
    use tokio::io::duplex;

    #[test]
    fn test_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.inbound_capacity, DEFAULT_INBOUND_CAPACITY);
        assert_eq!(config.writer.max_pending_frames, DEFAULT_MAX_PENDING_FRAMES);
    }

    #[tokio::test]
    async fn test_open_and_close_channels() {
        let (local, _peer) = duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let (conn, control) = Connection::start(reader, writer, ConnectionConfig::default());
        assert_eq!(control.channel(), 0);

        let ch = conn.open_channel(1).await.unwrap();
        assert_eq!(ch.channel(), 1);

        // Duplicate and reserved numbers are rejected
        assert!(conn.open_channel(1).await.is_err());
        assert!(conn.open_channel(0).await.is_err());

        ch.close().await.unwrap();
        // Number is free again after close
        let _ch = conn.open_channel(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_reaches_the_wire() {
        let (local, peer) = duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let (conn, _control) = Connection::start(reader, writer, ConnectionConfig::default());

        let ch = conn.open_channel(1).await.unwrap();
        ch.send(
            &basic::PUBLISH,
            vec![
                FieldValue::Short(0),
                FieldValue::ShortStr(String::new()),
                FieldValue::ShortStr("key".to_string()),
                FieldValue::Bit(false),
                FieldValue::Bit(false),
            ],
        )
        .await
        .unwrap();

        let (mut peer_reader, _peer_writer) = tokio::io::split(peer);
        let mut assembler = FrameAssembler::new();
        let mut buf = vec![0u8; 1024];
        let frame = loop {
            let n = peer_reader.read(&mut buf).await.unwrap();
            assert!(n > 0, "peer saw EOF before the frame");
            if let Some(frame) = assembler.push(&buf[..n]).unwrap().into_iter().next() {
                break frame;
            }
        };

        assert_eq!(frame.header.channel, 1);
        let method =
            MethodFrame::decode(MethodRegistry::amqp091(), frame.header.channel, &frame.payload)
                .unwrap();
        assert_eq!(method.name(), "Basic.Publish");
    }

    #[tokio::test]
    async fn test_send_rejects_synchronous_method() {
        let (local, _peer) = duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let (conn, _control) = Connection::start(reader, writer, ConnectionConfig::default());

        let ch = conn.open_channel(1).await.unwrap();
        let err = ch
            .send(&crate::method::defs::channel::FLOW, vec![FieldValue::Bit(true)])
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_call_timeout_without_peer_response() {
        let (local, _peer) = duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let (conn, _control) = Connection::start(reader, writer, ConnectionConfig::default());

        let ch = conn.open_channel(1).await.unwrap();
        let err = ch
            .call_timeout(
                &crate::method::defs::channel::FLOW,
                vec![FieldValue::Bit(true)],
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::Timeout));
    }

    #[tokio::test]
    async fn test_shutdown_on_transport_close() {
        let (local, peer) = duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let (conn, _control) = Connection::start(reader, writer, ConnectionConfig::default());

        drop(peer); // EOF on the read half
        conn.wait_for_shutdown().await.unwrap();
    }
}
