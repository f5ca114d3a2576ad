//! Outbound proxy adapters.
//!
//! The bridge never speaks a proxy protocol itself. An adapter takes
//! destination [`Metadata`] and returns a connected stream; an
//! [`OutboundProvider`] builds adapters from protocol option structures.
//!
//! ```text
//!   ShadowsocksOption ─┐
//!   ShadowsocksROption ┼─> OutboundProvider ─> Arc<dyn ProxyAdapter> ─> Bridge
//!   SnellOption ───────┘
//! ```

mod direct;
mod options;

pub use direct::DirectAdapter;
pub use options::{
    normalize_plugin, parse_plugin_opts, ShadowsocksOption, ShadowsocksROption, SnellObfsOption,
    SnellOption,
};

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::AdapterError;
use crate::metadata::Metadata;

/// A connected, bidirectional transport.
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ProxyStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed transport returned by adapters.
pub type BoxedStream = Box<dyn ProxyStream>;

/// Protocol family of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Connects to the destination directly
    Direct,
    /// Shadowsocks
    Shadowsocks,
    /// ShadowsocksR
    ShadowsocksR,
    /// Snell
    Snell,
    /// Anything else a host plugs in
    Other,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterKind::Direct => write!(f, "Direct"),
            AdapterKind::Shadowsocks => write!(f, "Shadowsocks"),
            AdapterKind::ShadowsocksR => write!(f, "ShadowsocksR"),
            AdapterKind::Snell => write!(f, "Snell"),
            AdapterKind::Other => write!(f, "Other"),
        }
    }
}

/// Dials destinations through some outbound proxy.
///
/// Adapters are shared across relay tasks and must not need `&mut self`.
#[async_trait]
pub trait ProxyAdapter: Send + Sync + fmt::Debug {
    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    /// Protocol family.
    fn kind(&self) -> AdapterKind;

    /// Open a connection to `metadata` through this outbound.
    async fn dial(&self, metadata: &Metadata) -> io::Result<BoxedStream>;
}

/// Builds protocol adapters from option structures.
///
/// This is the seam to the library that actually implements the proxy
/// protocols. Errors are passed back to the caller as-is.
pub trait OutboundProvider: Send + Sync {
    /// Build a Shadowsocks adapter.
    fn shadowsocks(
        &self,
        opts: ShadowsocksOption,
    ) -> Result<Arc<dyn ProxyAdapter>, AdapterError>;

    /// Build a ShadowsocksR adapter.
    fn shadowsocksr(
        &self,
        opts: ShadowsocksROption,
    ) -> Result<Arc<dyn ProxyAdapter>, AdapterError>;

    /// Build a Snell adapter.
    fn snell(&self, opts: SnellOption) -> Result<Arc<dyn ProxyAdapter>, AdapterError>;
}

/// Provider used when the host has not registered one.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableProvider;

impl UnavailableProvider {
    fn unavailable(kind: AdapterKind) -> AdapterError {
        format!("no outbound provider registered for {}", kind).into()
    }
}

impl OutboundProvider for UnavailableProvider {
    fn shadowsocks(&self, _: ShadowsocksOption) -> Result<Arc<dyn ProxyAdapter>, AdapterError> {
        Err(Self::unavailable(AdapterKind::Shadowsocks))
    }

    fn shadowsocksr(&self, _: ShadowsocksROption) -> Result<Arc<dyn ProxyAdapter>, AdapterError> {
        Err(Self::unavailable(AdapterKind::ShadowsocksR))
    }

    fn snell(&self, _: SnellOption) -> Result<Arc<dyn ProxyAdapter>, AdapterError> {
        Err(Self::unavailable(AdapterKind::Snell))
    }
}
