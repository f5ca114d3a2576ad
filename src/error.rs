//! Error types for the proxy bridge.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by an outbound provider or adapter library.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during bridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// `start` called on a running bridge
    #[error("already started")]
    AlreadyStarted,

    /// `close` called on a bridge that was never started
    #[error("not started")]
    NotStarted,

    /// Bridge instances are single use; this one has been closed
    #[error("bridge closed")]
    Closed,

    /// Local SOCKS listener could not be bound
    #[error("create socks inbound on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Destination string is not a valid `host:port`
    #[error("invalid address {address}: {reason}")]
    InvalidAddress {
        /// Raw address as given by the caller
        address: String,
        /// What was wrong with it
        reason: &'static str,
    },

    /// Transport name outside the tcp/udp family
    #[error("unexpected network name {0}")]
    UnsupportedNetwork(String),

    /// Shadowsocks plugin options are not a JSON object
    #[error("invalid plugin options: {0}")]
    PluginOptions(#[from] serde_json::Error),

    /// Error returned unchanged from the outbound adapter library
    #[error(transparent)]
    Adapter(AdapterError),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Malformed SOCKS request
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No tokio runtime to run the bridge tasks on
    #[error("no tokio runtime available")]
    Runtime,
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new adapter error from any library error
    pub fn adapter(err: impl Into<AdapterError>) -> Self {
        Error::Adapter(err.into())
    }

    /// Check if this error reports start/close misuse
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Error::AlreadyStarted | Error::NotStarted | Error::Closed
        )
    }

    /// Check if the caller can reasonably retry the failed call.
    ///
    /// A bind failure can be retried with another port; a failed dial can be
    /// attempted again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Bind { .. } | Error::Network(_))
    }
}
