use amiquip::{
    AmqpProperties, Channel, Connection, Consumer, ConsumerMessage, ConsumerOptions, Publish,
};
use log::{debug, info, trace};
use std::fmt;

use crate::broker::{
    method, ControlFrame, DeliveryMode, Inbound, Message, MessageProperties, MessageSink,
    MessageSource,
};
use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 5672;
pub const DEFAULT_VHOST: &str = "/";
pub const DEFAULT_CREDENTIAL: &str = "guest";

/// Where and as whom to log in.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub username: String,
    pub password: String,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectionParams {
            host: host.into(),
            port,
            vhost: DEFAULT_VHOST.to_string(),
            username: DEFAULT_CREDENTIAL.to_string(),
            password: DEFAULT_CREDENTIAL.to_string(),
        }
    }

    /// amqp:// URL with the credentials and vhost percent-encoded, so a vhost
    /// of "/" becomes "%2F".
    pub fn amqp_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            encode_component(&self.username),
            encode_component(&self.password),
            self.host,
            self.port,
            encode_component(&self.vhost)
        )
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// One connection with one channel open on it.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

impl AmqpSession {
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        info!("Connecting to {}:{} vhost '{}'", params.host, params.port, params.vhost);
        let mut connection = Connection::insecure_open(&params.amqp_url())
            .map_err(|source| Error::Connection {
                context: "Logging in",
                source,
            })?;

        // None lets the library choose the channel id.
        let channel = connection
            .open_channel(None)
            .map_err(Error::amqp("Opening channel"))?;
        debug!("Channel {} open", channel.channel_id());

        Ok(AmqpSession { connection, channel })
    }

    pub fn publisher(&self) -> AmqpPublisher<'_> {
        AmqpPublisher {
            channel: &self.channel,
        }
    }

    /// Starts a no-ack consumer on `queue`. The broker forgets each message
    /// as soon as it is delivered.
    pub fn consumer(&self, queue: &str) -> Result<AmqpConsumer<'_>> {
        let options = ConsumerOptions {
            no_ack: true,
            ..ConsumerOptions::default()
        };
        let consumer = self
            .channel
            .basic_consume(queue, options)
            .map_err(Error::amqp("Consuming"))?;
        trace!("Consumer '{}' attached to queue '{}'", consumer.consumer_tag(), queue);

        Ok(AmqpConsumer {
            channel: &self.channel,
            consumer,
        })
    }

    pub fn close(self) -> Result<()> {
        self.channel.close().map_err(Error::amqp("Closing channel"))?;
        self.connection
            .close()
            .map_err(Error::amqp("Closing connection"))
    }
}

pub struct AmqpPublisher<'a> {
    channel: &'a Channel,
}

impl MessageSink for AmqpPublisher<'_> {
    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        properties: &MessageProperties,
        body: &[u8],
    ) -> Result<()> {
        publish_on(self.channel, exchange, routing_key, properties, body)
    }
}

pub struct AmqpConsumer<'a> {
    channel: &'a Channel,
    consumer: Consumer<'a>,
}

impl MessageSink for AmqpConsumer<'_> {
    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        properties: &MessageProperties,
        body: &[u8],
    ) -> Result<()> {
        publish_on(self.channel, exchange, routing_key, properties, body)
    }
}

impl MessageSource for AmqpConsumer<'_> {
    fn consume_next(&mut self) -> Result<Inbound> {
        let message = self
            .consumer
            .receiver()
            .recv()
            .map_err(|e| Error::Client {
                context: "Consuming",
                message: e.to_string(),
            })?;

        let inbound = match message {
            ConsumerMessage::Delivery(delivery) => Inbound::Delivery(Message::new(
                delivery.body,
                from_amqp_properties(&delivery.properties),
            )),
            ConsumerMessage::ServerClosedChannel(e) => {
                Inbound::Control(ControlFrame::ChannelClose(e.to_string()))
            }
            ConsumerMessage::ClientClosedChannel => {
                Inbound::Control(ControlFrame::ChannelClose("closed by client".to_string()))
            }
            ConsumerMessage::ServerClosedConnection(e) => {
                Inbound::Control(ControlFrame::ConnectionClose(e.to_string()))
            }
            ConsumerMessage::ClientClosedConnection => Inbound::Control(
                ControlFrame::ConnectionClose("closed by client".to_string()),
            ),
            ConsumerMessage::ServerCancelled | ConsumerMessage::ClientCancelled => {
                Inbound::Control(ControlFrame::Method(method::BASIC_CANCEL))
            }
        };
        Ok(inbound)
    }
}

fn publish_on(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    properties: &MessageProperties,
    body: &[u8],
) -> Result<()> {
    channel
        .basic_publish(
            exchange,
            Publish::with_properties(body, routing_key, to_amqp_properties(properties)),
        )
        .map_err(Error::amqp("Publishing"))
}

fn to_amqp_properties(properties: &MessageProperties) -> AmqpProperties {
    let mut amqp = AmqpProperties::default();
    if let Some(content_type) = &properties.content_type {
        amqp = amqp.with_content_type(content_type.clone());
    }
    if let Some(mode) = properties.delivery_mode {
        amqp = amqp.with_delivery_mode(mode as u8);
    }
    if let Some(message_id) = &properties.message_id {
        amqp = amqp.with_message_id(message_id.clone());
    }
    amqp
}

fn from_amqp_properties(amqp: &AmqpProperties) -> MessageProperties {
    MessageProperties {
        content_type: amqp.content_type().clone(),
        delivery_mode: amqp.delivery_mode().and_then(DeliveryMode::from_u8),
        message_id: amqp.message_id().clone(),
    }
}
