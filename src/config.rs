//! Bridge configuration.

use serde::{Deserialize, Serialize};

/// Host the SOCKS inbound binds to unless configured otherwise.
pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";

/// Capacity of the queue between the SOCKS inbound and the dispatcher.
///
/// When this many connections are negotiating or waiting for dispatch, the
/// inbound stops accepting.
pub const DEFAULT_ACCEPT_QUEUE: usize = 100;

/// Configuration for one bridge instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Listen host for the SOCKS inbound
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Listen port for the SOCKS inbound (0 picks an ephemeral port)
    pub socks_port: u16,

    /// Accept queue capacity
    #[serde(default = "default_accept_queue")]
    pub accept_queue: usize,
}

fn default_listen_host() -> String {
    DEFAULT_LISTEN_HOST.to_string()
}

fn default_accept_queue() -> usize {
    DEFAULT_ACCEPT_QUEUE
}

impl BridgeConfig {
    /// Loopback listener on `socks_port` with the default queue.
    pub fn new(socks_port: u16) -> Self {
        Self {
            listen_host: default_listen_host(),
            socks_port,
            accept_queue: DEFAULT_ACCEPT_QUEUE,
        }
    }

    /// Set the accept queue capacity.
    pub fn with_accept_queue(mut self, capacity: usize) -> Self {
        self.accept_queue = capacity;
        self
    }

    /// `host:port` the inbound binds to.
    pub fn listen_addr(&self) -> String {
        if self.listen_host.contains(':') {
            format!("[{}]:{}", self.listen_host, self.socks_port)
        } else {
            format!("{}:{}", self.listen_host, self.socks_port)
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_host.is_empty() {
            return Err("listen_host cannot be empty".into());
        }
        if self.accept_queue == 0 {
            return Err("accept_queue must be at least 1".into());
        }
        Ok(())
    }
}
