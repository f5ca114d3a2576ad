//! # proxy-bridge
//!
//! Exposes a local SOCKS endpoint and relays every accepted connection
//! through an outbound proxy adapter (Shadowsocks, ShadowsocksR, Snell, or
//! anything implementing [`ProxyAdapter`]).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Host application                       │
//! ├─────────────────────────────────────────────────────────┤
//! │  Bridge (start / close / dial_context, single use)      │
//! ├─────────────────────────────────────────────────────────┤
//! │  SOCKS inbound → bounded queue → per-connection relay   │
//! ├─────────────────────────────────────────────────────────┤
//! │  ProxyAdapter (built by the host's OutboundProvider)    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The proxy protocols themselves live behind [`OutboundProvider`]; this crate
//! only builds their option structures and wires a listener to an adapter.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use proxy_bridge::{Bridge, BridgeConfig, Context, DirectAdapter};
//!
//! # async fn run() -> proxy_bridge::Result<()> {
//! let ctx = Context::current()?;
//! let bridge = Bridge::new(ctx, BridgeConfig::new(1080), Arc::new(DirectAdapter::new()));
//! bridge.start()?;
//! // ...
//! bridge.close().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod metadata;
pub mod proxy;

pub use adapter::{
    AdapterKind, BoxedStream, DirectAdapter, OutboundProvider, ProxyAdapter, ProxyStream,
    ShadowsocksOption, ShadowsocksROption, SnellObfsOption, SnellOption, UnavailableProvider,
};
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use context::Context;
pub use error::{AdapterError, Error, Result};
pub use metadata::{addr_to_metadata, AddrType, Metadata, Network};

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber writing to stdout.
///
/// `RUST_LOG` directives (e.g. `RUST_LOG=proxy_bridge=debug`) take precedence;
/// `level` applies when the variable is unset or unparsable. Safe to call more
/// than once; only the first call has an effect.
pub fn init_logging(level: tracing::Level) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(log_filter(std::env::var("RUST_LOG").ok(), level))
            .with_target(false)
            .try_init();
    });
}

fn log_filter(directives: Option<String>, level: tracing::Level) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging(tracing::Level::DEBUG);
        init_logging(tracing::Level::INFO);
    }

    #[test]
    fn test_log_filter_prefers_env_directives() {
        use tracing::level_filters::LevelFilter;

        let filter = log_filter(Some("debug".into()), tracing::Level::INFO);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        let filter = log_filter(None, tracing::Level::WARN);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));

        // unparsable RUST_LOG falls back to the given level
        let filter = log_filter(Some("info,proxy_bridge=loud".into()), tracing::Level::ERROR);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
    }
}
