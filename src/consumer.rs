//! The agent side: take one task at a time, record it, answer it.

use log::{debug, log_enabled, trace, warn, Level};
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use std::io::{self, Write};

use crate::broker::{
    ControlOutcome, DeliveryMode, Inbound, Message, MessageProperties, MessageSink,
    MessageSource, DEFAULT_EXCHANGE,
};
use crate::error::{Error, Result};
use crate::util::hex_dump;

pub const RECORD_HEADER: &[u8] = b"A new message received:\n";
pub const RECORD_TRAILER: &[u8] = b"\n\n";
pub const REPLY_CONTENT_TYPE: &str = "text/json";

/// Where replies go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub exchange: String,
    pub routing_key: String,
}

impl ReplyTarget {
    /// Replies through the default exchange, straight into the queue named
    /// by `routing_key`.
    pub fn new(routing_key: impl Into<String>) -> Self {
        ReplyTarget {
            exchange: DEFAULT_EXCHANGE.to_string(),
            routing_key: routing_key.into(),
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }
}

/// The canned "everything succeeded" answer to a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplyEnvelope {
    is_exception: bool,
    result: Vec<StepResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StepResult {
    is_exception: bool,
    result: Vec<serde_json::Value>,
}

impl ReplyEnvelope {
    pub fn success() -> Self {
        ReplyEnvelope {
            is_exception: false,
            result: vec![StepResult {
                is_exception: false,
                result: Vec::new(),
            }],
        }
    }

    /// `{"IsException": false, "Result": [{"IsException": false, "Result": []}]}`
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut serializer = Serializer::with_formatter(&mut body, SpacedFormatter);
        self.serialize(&mut serializer)
            .map_err(|e| Error::Protocol(format!("malformed reply: {}", e)))?;
        Ok(body)
    }
}

/// Compact JSON with a space after every `:` and `,`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Why the loop stopped, and how much it did before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    pub received: u64,
    pub outcome: ControlOutcome,
}

/// Header, raw body bytes, blank line. Binary bodies pass through untouched.
pub fn write_record<W: Write>(out: &mut W, body: &[u8]) -> io::Result<()> {
    out.write_all(RECORD_HEADER)?;
    out.write_all(body)?;
    out.write_all(RECORD_TRAILER)
}

/// Consumes until the broker closes something or sends a method we do not
/// handle. Each delivery is printed to `stdout`, appended to `log` and
/// answered with [`ReplyEnvelope::success`] carrying the delivery's message id.
///
/// Errors from the client, from publishing or from writing the log end the
/// loop with `Err`.
pub fn run_consume_loop<C, O, L>(
    client: &mut C,
    target: &ReplyTarget,
    stdout: &mut O,
    log: &mut L,
) -> Result<LoopExit>
where
    C: MessageSource + MessageSink,
    O: Write,
    L: Write,
{
    let mut received = 0;

    loop {
        match client.consume_next()? {
            Inbound::Delivery(message) => {
                handle_delivery(client, target, &message, stdout, log)?;
                received += 1;
            }
            Inbound::Control(frame) => {
                let outcome = frame.classify();
                match outcome {
                    ControlOutcome::Acknowledged => trace!("Publish confirmed"),
                    ControlOutcome::Returned => {
                        // The bounced message is dropped with the frame.
                        debug!("Discarding returned message");
                    }
                    ControlOutcome::ChannelClosed | ControlOutcome::ConnectionClosed => {
                        warn!(
                            "Consume loop stopping on method 0x{:08X}: {:?}",
                            frame.method_id(),
                            frame
                        );
                    }
                    ControlOutcome::UnexpectedMethod(_) => warn!("{}", outcome),
                }

                if outcome.is_terminal() {
                    return Ok(LoopExit { received, outcome });
                }
            }
        }
    }
}

fn handle_delivery<C, O, L>(
    client: &mut C,
    target: &ReplyTarget,
    message: &Message,
    stdout: &mut O,
    log: &mut L,
) -> Result<()>
where
    C: MessageSink,
    O: Write,
    L: Write,
{
    write_record(stdout, &message.body).map_err(Error::io("Writing to stdout"))?;
    writeln!(stdout, "message id: {}", message.message_id().unwrap_or(""))
        .map_err(Error::io("Writing to stdout"))?;

    if log_enabled!(Level::Debug) {
        debug!("Message body:\n{}", hex_dump(&message.body));
    }

    write_record(log, &message.body).map_err(Error::io("Writing to the log file"))?;
    log.flush().map_err(Error::io("Writing to the log file"))?;

    let mut properties = MessageProperties::default()
        .with_content_type(REPLY_CONTENT_TYPE)
        .with_delivery_mode(DeliveryMode::Persistent);
    properties.message_id = message.properties.message_id.clone();

    let body = ReplyEnvelope::success().to_bytes()?;
    client.publish(&target.exchange, &target.routing_key, &properties, &body)?;
    trace!("Replied to '{}' via '{}'", target.routing_key, target.exchange);
    Ok(())
}
