//! Local SOCKS inbound and the relay that connects it to an outbound.
//!
//! Inbound side: a local listener that negotiates SOCKS and queues connections.
//! Relay side: a byte copy between each queued connection and its remote.

pub mod relay;
pub mod socks5;
