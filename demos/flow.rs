//! Flow control - a synchronous call over an in-memory connection.
//!
//! This example demonstrates:
//! - Starting a [`Connection`] over any `AsyncRead`/`AsyncWrite` pair
//! - Opening a channel and making a synchronous `Channel.Flow` call
//! - Sending an asynchronous `Basic.Publish` on the same channel
//!
//! The peer side of the duplex stands in for a broker: it decodes every
//! method frame it receives and answers `Channel.Flow` with a matching
//! `Channel.FlowOk`.
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=methodwire=debug cargo run --example flow
//! ```

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

use methodwire::framing::{encode_frame, FrameAssembler, FrameKind};
use methodwire::method::defs::{basic, channel};
use methodwire::{Connection, ConnectionConfig, FieldValue, MethodFrame, MethodRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (local, peer) = duplex(8192);

    // The "broker" half: decode inbound methods, answer Flow with FlowOk
    tokio::spawn(async move {
        let registry = MethodRegistry::amqp091();
        let (mut reader, mut writer) = tokio::io::split(peer);
        let mut assembler = FrameAssembler::new();
        let mut buf = vec![0u8; 4096];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let frames = match assembler.push(&buf[..n]) {
                Ok(frames) => frames,
                Err(_) => return,
            };
            for frame in frames {
                let Ok(method) =
                    MethodFrame::decode(registry, frame.header.channel, &frame.payload)
                else {
                    continue;
                };
                println!("peer received {} on channel {}", method.name(), method.channel());

                if method.id() == channel::FLOW.id() {
                    let active = method.value("active").and_then(|v| v.as_bit()).unwrap_or(true);
                    let Ok(reply) = MethodFrame::new(
                        &channel::FLOW_OK,
                        method.channel(),
                        vec![FieldValue::Bit(active)],
                    ) else {
                        continue;
                    };
                    let Ok(payload) = reply.to_bytes() else {
                        continue;
                    };
                    let bytes = encode_frame(FrameKind::Method, method.channel(), &payload);
                    if writer.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    // The client half
    let (reader, writer) = tokio::io::split(local);
    let (conn, _control) = Connection::start(reader, writer, ConnectionConfig::default());

    let ch = conn.open_channel(1).await?;

    // Synchronous: blocks until the peer's FlowOk arrives
    let reply = ch.call(&channel::FLOW, vec![FieldValue::Bit(true)]).await?;
    println!(
        "call completed: {} (active = {:?})",
        reply.name(),
        reply.value("active").and_then(|v| v.as_bit())
    );

    // Asynchronous: fire-and-forget, no response expected
    ch.send(
        &basic::PUBLISH,
        vec![
            FieldValue::Short(0),
            FieldValue::ShortStr(String::new()),
            FieldValue::ShortStr("demo.key".to_string()),
            FieldValue::Bit(false),
            FieldValue::Bit(false),
        ],
    )
    .await?;
    println!("published a fire-and-forget method");

    // Give the peer a moment to log the publish before exiting
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    Ok(())
}
