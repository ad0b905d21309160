//! The narrow slice of a broker client the agent and producer call through.
//!
//! Connection setup, authentication and channel lifecycle live in
//! [`crate::client`]; everything here is plain data plus two traits.

use std::fmt;

use crate::error::Result;

/// The nameless direct exchange every queue is bound to by name.
pub const DEFAULT_EXCHANGE: &str = "";

/// AMQP method ids (class << 16 | method) for the frames the consume loop
/// knows how to handle.
pub mod method {
    pub const CONNECTION_CLOSE: u32 = 0x000A_0032;
    pub const CHANNEL_CLOSE: u32 = 0x0014_0028;
    pub const BASIC_CANCEL: u32 = 0x003C_001E;
    pub const BASIC_RETURN: u32 = 0x003C_0032;
    pub const BASIC_ACK: u32 = 0x003C_0050;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Transient = 1,
    Persistent = 2,
}

impl DeliveryMode {
    pub fn from_u8(mode: u8) -> Option<Self> {
        match mode {
            1 => Some(DeliveryMode::Transient),
            2 => Some(DeliveryMode::Persistent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    pub delivery_mode: Option<DeliveryMode>,
    pub message_id: Option<String>,
}

impl MessageProperties {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = Some(mode);
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub properties: MessageProperties,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>, properties: MessageProperties) -> Self {
        Message {
            properties,
            body: body.into(),
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        self.properties.message_id.as_deref()
    }
}

/// A broker-initiated signal that is not a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// basic.ack for something we published with confirms on.
    Ack,
    /// basic.return carrying the message that could not be routed.
    Return(Message),
    ChannelClose(String),
    ConnectionClose(String),
    /// Any other method, by id.
    Method(u32),
}

impl ControlFrame {
    pub fn method_id(&self) -> u32 {
        match self {
            ControlFrame::Ack => method::BASIC_ACK,
            ControlFrame::Return(_) => method::BASIC_RETURN,
            ControlFrame::ChannelClose(_) => method::CHANNEL_CLOSE,
            ControlFrame::ConnectionClose(_) => method::CONNECTION_CLOSE,
            ControlFrame::Method(id) => *id,
        }
    }

    pub fn classify(&self) -> ControlOutcome {
        match self {
            ControlFrame::Ack => ControlOutcome::Acknowledged,
            ControlFrame::Return(_) => ControlOutcome::Returned,
            ControlFrame::ChannelClose(_) => ControlOutcome::ChannelClosed,
            ControlFrame::ConnectionClose(_) => ControlOutcome::ConnectionClosed,
            ControlFrame::Method(id) => ControlOutcome::UnexpectedMethod(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Acknowledged,
    Returned,
    ChannelClosed,
    ConnectionClosed,
    UnexpectedMethod(u32),
}

impl ControlOutcome {
    /// Acks and returns are steady-state traffic; everything else ends the
    /// consume loop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ControlOutcome::Acknowledged | ControlOutcome::Returned)
    }
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlOutcome::Acknowledged => write!(f, "publish acknowledged"),
            ControlOutcome::Returned => write!(f, "published message returned"),
            ControlOutcome::ChannelClosed => write!(f, "channel closed by broker"),
            ControlOutcome::ConnectionClosed => write!(f, "connection closed by broker"),
            ControlOutcome::UnexpectedMethod(id) => {
                write!(f, "an unexpected method was received {} (0x{:08X})", id, id)
            }
        }
    }
}

/// What one blocking receive produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Delivery(Message),
    Control(ControlFrame),
}

pub trait MessageSink {
    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        properties: &MessageProperties,
        body: &[u8],
    ) -> Result<()>;
}

pub trait MessageSource {
    /// Blocks until the broker hands over a delivery or a control frame.
    fn consume_next(&mut self) -> Result<Inbound>;
}
