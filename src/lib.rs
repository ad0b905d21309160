//! Two small AMQP demo programs share this library: an `agent` that answers
//! every queued task with a canned success reply, and a `producer` that pushes
//! a paced stream of messages at a broker and reports the throughput.
//!
//! The broker itself is reached through the [`broker::MessageSink`] and
//! [`broker::MessageSource`] traits. [`client`] implements them on top of
//! amiquip; the tests drive the core through a scripted in-memory client.

pub mod broker;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod publisher;
pub mod util;

pub use error::{Error, Result};
