use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every error is terminal: callers stop what they are doing and the
/// binaries print the message and exit with status 1.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing key, unreadable file or an argument out of range.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Socket or authentication failure while reaching the broker.
    #[error("{context}: {source}")]
    Connection {
        context: &'static str,
        #[source]
        source: amiquip::Error,
    },

    /// The broker said something we cannot act on.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Any other broker call failing after the session is up.
    #[error("{context}: {source}")]
    Amqp {
        context: &'static str,
        #[source]
        source: amiquip::Error,
    },

    /// Client failure without an underlying amiquip error.
    #[error("{context}: {message}")]
    Client {
        context: &'static str,
        message: String,
    },
}

impl Error {
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> Error {
        let context = context.into();
        move |source| Error::Io { context, source }
    }

    pub fn amqp(context: &'static str) -> impl FnOnce(amiquip::Error) -> Error {
        move |source| Error::Amqp { context, source }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Configuration(e.to_string())
    }
}
