//! Adapter that connects to destinations without any upstream proxy.

use std::io;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{AdapterKind, BoxedStream, ProxyAdapter};
use crate::metadata::{Metadata, Network};

/// Dials the destination over plain TCP.
#[derive(Debug, Clone)]
pub struct DirectAdapter {
    name: String,
}

impl DirectAdapter {
    /// Create a direct adapter.
    pub fn new() -> Self {
        Self {
            name: "DIRECT".to_string(),
        }
    }
}

impl Default for DirectAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxyAdapter for DirectAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Direct
    }

    async fn dial(&self, metadata: &Metadata) -> io::Result<BoxedStream> {
        if metadata.network == Network::Udp {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "direct adapter does not relay udp",
            ));
        }

        let target = metadata.remote_address();
        let stream = TcpStream::connect(&target).await?;
        stream.set_nodelay(true)?;
        tracing::debug!("direct connection to {} established", target);

        Ok(Box::new(stream))
    }
}
